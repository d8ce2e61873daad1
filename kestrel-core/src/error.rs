//! Error types for the Kestrel core library.

use thiserror::Error;

/// Main error type for Kestrel core operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Invalid message format or content
    #[error("Invalid message: {message}")]
    InvalidMessage {
        /// Description of the violation
        message: String,
    },

    /// Invalid address name
    #[error("Invalid address: {message}")]
    InvalidAddress {
        /// Description of the violation
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the violation
        message: String,
    },

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure
        message: String,
    },
}

/// Result type alias for Kestrel core operations.
pub type Result<T> = std::result::Result<T, Error>;
