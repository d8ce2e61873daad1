//! # Kestrel Core
//!
//! Core message model for the Kestrel distributed message broker.
//!
//! This crate provides the building blocks shared by every broker component:
//! - Message definitions with zero-copy payloads and routing annotations
//! - Address names, including the fully-qualified `address::queue` syntax
//! - The filter predicate contract evaluated during routing
//! - Shared configuration schema and error types
//!
//! ## Examples
//!
//! ```rust
//! use kestrel_core::{Address, Message};
//!
//! let payload = bytes::Bytes::from_static(b"hello world");
//! let message = Message::new("orders.incoming", payload).unwrap();
//! assert_eq!(message.address().as_str(), "orders.incoming");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod address;
pub mod config;
pub mod error;
pub mod filter;
pub mod message;
pub mod types;

pub use address::Address;
pub use config::RoutingConfig;
pub use error::{Error, Result};
pub use filter::Filter;
pub use message::{Message, MessageBuilder, MessageId};
pub use types::{MessageLoadBalancing, Timestamp};

/// Re-export commonly used types for convenience.
pub mod prelude {
    pub use crate::address::Address;
    pub use crate::filter::Filter;
    pub use crate::message::{Message, MessageBuilder, MessageId};
    pub use crate::types::{MessageLoadBalancing, Timestamp};
    pub use crate::{Error, Result};
    pub use bytes::Bytes;
}
