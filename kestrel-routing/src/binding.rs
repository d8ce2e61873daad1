//! Queue bindings and their shared contract.
//!
//! A binding attaches a queue (local or remote) or a divert to an address.
//! The routing core treats bindings polymorphically through the [`Binding`]
//! trait and only branches on the [`BindingKind`] tag.

use crate::context::RoutingContext;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use kestrel_core::{Filter, Message, MessageLoadBalancing};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a binding, stable for the life of the binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingId(u64);

impl BindingId {
    /// Create a binding ID from a u64.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BindingId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<BindingId> for u64 {
    fn from(id: BindingId) -> Self {
        id.0
    }
}

/// Variant tag distinguishing the binding families the routing core
/// branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingKind {
    /// A queue hosted by this node.
    LocalQueue,
    /// A queue hosted by a cluster peer.
    RemoteQueue {
        /// The queue id on the remote node.
        remote_queue_id: u64,
        /// The load-balancing policy the peer advertises for its view.
        load_balancing: MessageLoadBalancing,
    },
    /// A divert redirecting messages to another address on this node.
    Divert,
}

impl BindingKind {
    /// Whether the binding lives on this node.
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::RemoteQueue { .. })
    }

    /// Whether the binding is a queue hosted by this node.
    pub fn is_local_queue(&self) -> bool {
        matches!(self, Self::LocalQueue)
    }

    /// Whether the binding is a queue hosted by a cluster peer.
    pub fn is_remote_queue(&self) -> bool {
        matches!(self, Self::RemoteQueue { .. })
    }
}

/// The attachment of a queue or divert to an address.
///
/// Multiple bindings may share a `routing_name`; they form a routing group
/// and load-balance among themselves. The `cluster_name` is stable across
/// the cluster and is how sticky group routing refers to a binding.
pub trait Binding: Send + Sync + fmt::Debug {
    /// Unique id of this binding within its table.
    fn id(&self) -> BindingId;

    /// Globally unique name of this binding within its table.
    fn unique_name(&self) -> &str;

    /// Grouping key; bindings sharing it load-balance.
    fn routing_name(&self) -> &str;

    /// Cluster-wide stable identifier, used by group routing.
    fn cluster_name(&self) -> &str;

    /// Optional predicate a message must satisfy to be routed here.
    fn filter(&self) -> Option<&dyn Filter>;

    /// Variant tag for the binding family.
    fn kind(&self) -> BindingKind;

    /// Exclusive bindings receive every matching message and preempt
    /// normal routing.
    fn is_exclusive(&self) -> bool;

    /// Whether the consumer side of this binding is currently attached.
    fn is_connected(&self) -> bool;

    /// Whether this binding has a consumer ready to accept the message.
    fn is_high_accept_priority(&self, message: &Message) -> bool;

    /// Id of the locally-attached queue, if this binding is backed by one.
    fn local_queue_id(&self) -> Option<u64> {
        None
    }

    /// Whether the binding lives on this node.
    fn is_local(&self) -> bool {
        self.kind().is_local()
    }

    /// Deliver the message through this binding, appending the decision to
    /// the routing context.
    ///
    /// # Errors
    /// Returns an error if the underlying queue rejects the message.
    fn route(&self, message: &Message, context: &mut dyn RoutingContext) -> crate::Result<()>;

    /// Like [`Binding::route`], but the receiving side must acknowledge the
    /// transfer back to the sending cluster bridge.
    ///
    /// # Errors
    /// Returns an error if the underlying queue rejects the message.
    fn route_with_ack(
        &self,
        message: &Message,
        context: &mut dyn RoutingContext,
    ) -> crate::Result<()>;

    /// Notification that a grouping proposal for `group_id` was cleared.
    fn unproposed(&self, group_id: &str);
}

/// A queue handle, used as the origin when redistributing messages the
/// local consumers did not accept.
pub trait Queue: Send + Sync {
    /// Queue id, matching [`Binding::local_queue_id`] of its binding.
    fn id(&self) -> u64;

    /// Queue name; doubles as the routing name of its binding group.
    fn name(&self) -> &str;
}

/// Encode binding ids as the big-endian 64-bit sequence used by the
/// reserved routing annotations.
pub fn encode_id_list(ids: &[u64]) -> Bytes {
    let mut buf = BytesMut::with_capacity(ids.len() * 8);
    for id in ids {
        buf.put_u64(*id);
    }
    buf.freeze()
}

/// Decode a big-endian 64-bit id sequence from a routing annotation.
/// Trailing partial words are ignored.
pub fn decode_id_list(bytes: &Bytes) -> Vec<u64> {
    let mut buf = bytes.clone();
    let mut ids = Vec::with_capacity(buf.remaining() / 8);
    while buf.remaining() >= 8 {
        ids.push(buf.get_u64());
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_list_roundtrip() {
        let ids = vec![1, u64::MAX, 42];
        let encoded = encode_id_list(&ids);
        assert_eq!(encoded.len(), 24);
        assert_eq!(decode_id_list(&encoded), ids);
    }

    #[test]
    fn test_id_list_big_endian() {
        let encoded = encode_id_list(&[7]);
        assert_eq!(encoded.as_ref(), &[0, 0, 0, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn test_id_list_ignores_trailing_bytes() {
        let mut partial = BytesMut::new();
        partial.put_u64(9);
        partial.put_u8(0xFF);
        assert_eq!(decode_id_list(&partial.freeze()), vec![9]);
    }

    #[test]
    fn test_binding_kind_serde_roundtrip() {
        let kind = BindingKind::RemoteQueue {
            remote_queue_id: 42,
            load_balancing: MessageLoadBalancing::OnDemand,
        };
        let json = serde_json::to_string(&kind).unwrap();
        let parsed: BindingKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, kind);
    }

    #[test]
    fn test_binding_kind_tags() {
        let remote = BindingKind::RemoteQueue {
            remote_queue_id: 3,
            load_balancing: MessageLoadBalancing::OnDemand,
        };
        assert!(!remote.is_local());
        assert!(remote.is_remote_queue());
        assert!(!remote.is_local_queue());

        assert!(BindingKind::LocalQueue.is_local());
        assert!(BindingKind::LocalQueue.is_local_queue());
        assert!(BindingKind::Divert.is_local());
        assert!(!BindingKind::Divert.is_local_queue());
    }
}
