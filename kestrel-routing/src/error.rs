//! Error types for the routing core.

use crate::binding::BindingId;
use thiserror::Error;

/// Errors surfaced while routing a message.
///
/// The routing core itself never fails on user-originated conditions
/// (unknown directive ids, missing groups, exhausted group retries are all
/// logged and handled); errors here originate from the bindings a message
/// is delivered through and are propagated unchanged.
#[derive(Error, Debug)]
pub enum Error {
    /// A queue binding failed to accept the message.
    #[error("Delivery failed on binding {binding}: {message}")]
    Delivery {
        /// The binding that rejected the message
        binding: BindingId,
        /// Description of the failure
        message: String,
    },

    /// Errors bubbled up from the core message model.
    #[error(transparent)]
    Core(#[from] kestrel_core::Error),
}

/// Result type alias for routing operations.
pub type Result<T> = std::result::Result<T, Error>;
