//! Round-robin binding selection with priority and filter evaluation.

use crate::binding::Binding;
use crate::index::GroupCursor;
use kestrel_core::{Message, MessageLoadBalancing};
use std::sync::Arc;

/// Advance a round-robin position by one, wrapping at `len`.
pub(crate) fn advance(position: usize, len: usize) -> usize {
    let next = position + 1;
    if next == len {
        0
    } else {
        next
    }
}

/// Whether a binding is eligible for the message at all under the given
/// load-balancing policy.
fn binding_matches(
    message: &Message,
    binding: &dyn Binding,
    load_balancing: MessageLoadBalancing,
) -> bool {
    if load_balancing == MessageLoadBalancing::Off && binding.kind().is_remote_queue() {
        return false;
    }
    match binding.filter() {
        Some(filter) => filter.matches(message),
        None => true,
    }
}

/// Pick the next binding of a routing group to receive the message, and
/// advance the group cursor past it.
///
/// Walks the group once starting at the cursor. A connected binding with an
/// accepting consumer (or any connected match under
/// [`MessageLoadBalancing::Strict`]) is taken immediately; otherwise the
/// walk remembers a fallback among the plain matches, preferring a local
/// queue under [`MessageLoadBalancing::OnDemand`]. A single-element group
/// skips the connectedness and priority tests. Returns `None` when nothing
/// matched; the cursor is then left untouched.
pub fn select(
    message: &Message,
    bindings: &[Arc<dyn Binding>],
    cursor: &GroupCursor,
    load_balancing: MessageLoadBalancing,
) -> Option<Arc<dyn Binding>> {
    let count = bindings.len();
    if count == 0 {
        return None;
    }

    let mut position = cursor.position() as usize;
    if position >= count {
        position = 0;
    }

    let mut chosen: Option<usize> = None;
    let mut fallback: Option<usize> = None;

    for _ in 0..count {
        let binding = &bindings[position];
        if binding_matches(message, binding.as_ref(), load_balancing) {
            // a single binding means no alternative, so skip the consumer
            // checks entirely
            if count == 1
                || (binding.is_connected()
                    && (load_balancing == MessageLoadBalancing::Strict
                        || binding.is_high_accept_priority(message)))
            {
                chosen = Some(position);
                position = advance(position, count);
                break;
            }
            // among fallbacks a local queue wins over a remote one when
            // balancing on demand
            if fallback.is_none()
                || (load_balancing == MessageLoadBalancing::OnDemand
                    && binding.kind().is_local_queue())
            {
                fallback = Some(position);
            }
        }
        position = advance(position, count);
    }

    let selected = match chosen {
        Some(index) => Some(index),
        None => fallback.map(|index| {
            position = advance(index, count);
            index
        }),
    };

    selected.map(|index| {
        cursor.set_position(position as u32);
        bindings[index].clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestBinding;
    use bytes::Bytes;

    fn message() -> Message {
        Message::new("orders", Bytes::new()).unwrap()
    }

    fn group(bindings: Vec<TestBinding>) -> Vec<Arc<dyn Binding>> {
        bindings.into_iter().map(|b| Arc::new(b) as Arc<dyn Binding>).collect()
    }

    #[test]
    fn test_round_robin_rotation() {
        let bindings = group(vec![
            TestBinding::local(1, "q1").with_routing_name("orders"),
            TestBinding::local(2, "q2").with_routing_name("orders"),
            TestBinding::local(3, "q3").with_routing_name("orders"),
        ]);
        let cursor = GroupCursor::new();

        let picks: Vec<u64> = (0..6)
            .map(|_| {
                select(&message(), &bindings, &cursor, MessageLoadBalancing::Strict)
                    .unwrap()
                    .id()
                    .as_u64()
            })
            .collect();
        assert_eq!(picks, vec![1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn test_off_excludes_remote() {
        let bindings = group(vec![
            TestBinding::local(1, "q1").with_routing_name("orders"),
            TestBinding::remote(2, "q2", 20, MessageLoadBalancing::Off).with_routing_name("orders"),
        ]);
        let cursor = GroupCursor::new();

        for _ in 0..4 {
            let picked =
                select(&message(), &bindings, &cursor, MessageLoadBalancing::Off).unwrap();
            assert_eq!(picked.id().as_u64(), 1);
        }
    }

    #[test]
    fn test_on_demand_prefers_connected_high_priority() {
        let bindings = group(vec![
            TestBinding::local(1, "q1").with_routing_name("orders").connected(false),
            TestBinding::remote(2, "q2", 20, MessageLoadBalancing::OnDemand)
                .with_routing_name("orders"),
        ]);
        let cursor = GroupCursor::new();

        let picked =
            select(&message(), &bindings, &cursor, MessageLoadBalancing::OnDemand).unwrap();
        assert_eq!(picked.id().as_u64(), 2);
    }

    #[test]
    fn test_on_demand_fallback_prefers_local() {
        let bindings = group(vec![
            TestBinding::remote(1, "q1", 10, MessageLoadBalancing::OnDemand)
                .with_routing_name("orders")
                .high_priority(false),
            TestBinding::local(2, "q2").with_routing_name("orders").high_priority(false),
        ]);
        let cursor = GroupCursor::new();

        let picked =
            select(&message(), &bindings, &cursor, MessageLoadBalancing::OnDemand).unwrap();
        assert_eq!(picked.id().as_u64(), 2);
    }

    #[test]
    fn test_single_binding_skips_consumer_checks() {
        let bindings = group(vec![TestBinding::local(1, "q1")
            .with_routing_name("orders")
            .connected(false)
            .high_priority(false)]);
        let cursor = GroupCursor::new();

        let picked =
            select(&message(), &bindings, &cursor, MessageLoadBalancing::OnDemand).unwrap();
        assert_eq!(picked.id().as_u64(), 1);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_no_match_leaves_cursor_untouched() {
        let bindings = group(vec![
            TestBinding::remote(1, "q1", 10, MessageLoadBalancing::Off).with_routing_name("orders"),
        ]);
        let cursor = GroupCursor::new();
        cursor.set_position(0);

        assert!(select(&message(), &bindings, &cursor, MessageLoadBalancing::Off).is_none());
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_stale_cursor_wraps_to_start() {
        let bindings = group(vec![
            TestBinding::local(1, "q1").with_routing_name("orders"),
            TestBinding::local(2, "q2").with_routing_name("orders"),
        ]);
        let cursor = GroupCursor::new();
        cursor.set_position(9);

        let picked =
            select(&message(), &bindings, &cursor, MessageLoadBalancing::Strict).unwrap();
        assert_eq!(picked.id().as_u64(), 1);
        assert_eq!(cursor.position(), 1);
    }
}
