//! # Kestrel Routing
//!
//! The message routing core of the Kestrel distributed message broker:
//! the per-address table of bindings that decides, for each inbound
//! message, which queues receive a copy.
//!
//! The core sits between the broker's post-office (address lookup,
//! protocol decoding, persistence) and the individual queue
//! implementations, and provides:
//!
//! - a concurrent, versioned binding registry keyed by routing name,
//!   binding id, and unique binding name
//! - round-robin load-balancing across peer bindings with priority and
//!   filter evaluation
//! - sticky message-group routing through a proposal/response exchange
//!   with the cluster-wide grouping coordinator
//! - redistribution of messages to remote peers when local consumers are
//!   absent
//! - a routing-context reuse optimization that skips re-selection while
//!   the binding topology is unchanged
//!
//! ## Examples
//!
//! ```rust
//! use kestrel_core::Message;
//! use kestrel_routing::context::StandardRoutingContext;
//! use kestrel_routing::table::AddressBindings;
//! use kestrel_routing::test_utils::TestBinding;
//! use std::sync::Arc;
//!
//! let table = AddressBindings::new("orders", None);
//! table.add(Arc::new(TestBinding::local(1, "orders-queue")));
//!
//! let mut message = Message::new("orders", bytes::Bytes::from_static(b"hi")).unwrap();
//! let mut context = StandardRoutingContext::new();
//! table.route(&mut message, &mut context).unwrap();
//! assert_eq!(context.binding_ids().len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod binding;
pub mod context;
pub mod error;
pub mod grouping;
pub mod index;
pub mod selector;
pub mod table;
pub mod test_utils;

pub use binding::{Binding, BindingId, BindingKind, Queue};
pub use context::{RoutingContext, StandardRoutingContext};
pub use error::{Error, Result};
pub use grouping::{GroupingHandler, Proposal, Response};
pub use table::{AddressBindings, MAX_GROUP_RETRY};
