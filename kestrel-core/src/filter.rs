//! Message filter predicates.
//!
//! Filters are attached to bindings and evaluated during routing. Selector
//! parsing happens upstream at binding creation time; the routing core only
//! ever evaluates the compiled predicate.

use crate::message::Message;
use std::fmt;

/// A predicate over messages, attached to a binding.
///
/// A binding without a filter accepts every message.
pub trait Filter: Send + Sync + fmt::Debug {
    /// Whether the message satisfies this filter.
    fn matches(&self, message: &Message) -> bool;
}
