//! Copy-on-write index from routing name to the bindings sharing it.
//!
//! The route path is read-heavy while add/remove is rare. Readers obtain an
//! immutable snapshot of a routing group plus its shared round-robin
//! cursor; writers build a new snapshot and publish it atomically under the
//! entry's shard lock.

use crate::binding::{Binding, BindingId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Immutable snapshot of the bindings in one routing group, in insertion
/// order.
pub type BindingSnapshot = Arc<[Arc<dyn Binding>]>;

/// Shared round-robin cursor for one routing group.
///
/// Holds the next-to-try position. The cursor outlives snapshot
/// replacements for its routing name; a position past the end of a
/// shrunken snapshot is treated as 0 by readers. Racing readers may both
/// observe the same position and route two messages to one binding while
/// advancing the cursor once; messages are never lost, so no locking is
/// applied here.
#[derive(Debug, Default)]
pub struct GroupCursor(AtomicU32);

impl GroupCursor {
    /// Create a cursor at position 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// The next-to-try position.
    pub fn position(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Store the next-to-try position.
    pub fn set_position(&self, position: u32) {
        self.0.store(position, Ordering::Relaxed);
    }
}

struct GroupEntry {
    bindings: BindingSnapshot,
    cursor: Arc<GroupCursor>,
}

/// Concurrent mapping from routing name to `(bindings, cursor)`.
#[derive(Default)]
pub struct RoutingNameIndex {
    groups: DashMap<String, GroupEntry>,
}

impl RoutingNameIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the binding to its routing group, creating the group with a
    /// fresh cursor if absent. A binding already present (by id) is left
    /// untouched.
    pub fn add(&self, binding: Arc<dyn Binding>) {
        match self.groups.entry(binding.routing_name().to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.bindings.iter().any(|b| b.id() == binding.id()) {
                    return;
                }
                let mut next: Vec<Arc<dyn Binding>> = entry.bindings.to_vec();
                next.push(binding);
                entry.bindings = next.into();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(GroupEntry {
                    bindings: vec![binding].into(),
                    cursor: Arc::new(GroupCursor::new()),
                });
            }
        }
    }

    /// Remove the binding from its routing group, preserving the order of
    /// the remainder. The group entry is dropped when it shrinks to zero.
    /// Returns whether the binding was present.
    pub fn remove(&self, binding: &dyn Binding) -> bool {
        let Entry::Occupied(mut occupied) = self.groups.entry(binding.routing_name().to_string())
        else {
            return false;
        };

        let next: Vec<Arc<dyn Binding>> = occupied
            .get()
            .bindings
            .iter()
            .filter(|b| b.id() != binding.id())
            .cloned()
            .collect();

        if next.len() == occupied.get().bindings.len() {
            return false;
        }
        if next.is_empty() {
            occupied.remove();
        } else {
            occupied.get_mut().bindings = next.into();
        }
        true
    }

    /// The snapshot and cursor for one routing name. Returns `None` when
    /// the group does not exist (including when it was concurrently
    /// removed).
    pub fn get(&self, routing_name: &str) -> Option<(BindingSnapshot, Arc<GroupCursor>)> {
        self.groups
            .get(routing_name)
            .map(|entry| (entry.bindings.clone(), entry.cursor.clone()))
    }

    /// Every routing group, each visited once in unspecified order.
    ///
    /// Hands out clones rather than iterating under shard locks: callers
    /// re-enter the index (and may mutate it) while walking the groups.
    pub fn snapshot(&self) -> Vec<(String, BindingSnapshot, Arc<GroupCursor>)> {
        self.groups
            .iter()
            .map(|entry| {
                (entry.key().clone(), entry.value().bindings.clone(), entry.value().cursor.clone())
            })
            .collect()
    }

    /// Whether the index holds no routing groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Copy the index into a plain map of binding ids. Debug and test use
    /// only.
    pub fn copy_as_map(&self) -> HashMap<String, Vec<BindingId>> {
        self.groups
            .iter()
            .map(|entry| {
                (entry.key().clone(), entry.value().bindings.iter().map(|b| b.id()).collect())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestBinding;
    use proptest::prelude::*;

    fn binding(id: u64, routing_name: &str) -> Arc<dyn Binding> {
        Arc::new(TestBinding::local(id, &format!("q{id}")).with_routing_name(routing_name))
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let index = RoutingNameIndex::new();
        index.add(binding(1, "orders"));
        index.add(binding(2, "orders"));
        index.add(binding(3, "orders"));

        let (bindings, cursor) = index.get("orders").unwrap();
        let ids: Vec<u64> = bindings.iter().map(|b| b.id().as_u64()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_add_is_idempotent_per_id() {
        let index = RoutingNameIndex::new();
        index.add(binding(1, "orders"));
        index.add(binding(1, "orders"));

        let (bindings, _) = index.get("orders").unwrap();
        assert_eq!(bindings.len(), 1);
    }

    #[test]
    fn test_remove_preserves_remainder_order() {
        let index = RoutingNameIndex::new();
        index.add(binding(1, "orders"));
        index.add(binding(2, "orders"));
        index.add(binding(3, "orders"));

        let two = binding(2, "orders");
        assert!(index.remove(two.as_ref()));
        assert!(!index.remove(two.as_ref()));

        let (bindings, _) = index.get("orders").unwrap();
        let ids: Vec<u64> = bindings.iter().map(|b| b.id().as_u64()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_empty_group_is_dropped() {
        let index = RoutingNameIndex::new();
        let one = binding(1, "orders");
        index.add(one.clone());
        assert!(!index.is_empty());

        index.remove(one.as_ref());
        assert!(index.get("orders").is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_cursor_survives_snapshot_replacement() {
        let index = RoutingNameIndex::new();
        index.add(binding(1, "orders"));

        let (_, cursor) = index.get("orders").unwrap();
        cursor.set_position(1);

        index.add(binding(2, "orders"));
        let (bindings, cursor_after) = index.get("orders").unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(cursor_after.position(), 1);
    }

    #[test]
    fn test_snapshot_visits_every_group_once() {
        let index = RoutingNameIndex::new();
        index.add(binding(1, "orders"));
        index.add(binding(2, "invoices"));

        let mut names: Vec<String> = index.snapshot().into_iter().map(|(name, ..)| name).collect();
        names.sort();
        assert_eq!(names, vec!["invoices", "orders"]);
    }

    proptest! {
        /// Interleaved adds and removes keep each group free of duplicates
        /// and in insertion order of the surviving bindings.
        #[test]
        fn prop_order_and_uniqueness(ops in proptest::collection::vec((any::<bool>(), 0u64..8), 1..64)) {
            let index = RoutingNameIndex::new();
            let mut model: Vec<u64> = Vec::new();

            for (add, id) in ops {
                if add {
                    index.add(binding(id, "orders"));
                    if !model.contains(&id) {
                        model.push(id);
                    }
                } else {
                    index.remove(binding(id, "orders").as_ref());
                    model.retain(|&m| m != id);
                }
            }

            let actual: Vec<u64> = index
                .get("orders")
                .map(|(bindings, _)| bindings.iter().map(|b| b.id().as_u64()).collect())
                .unwrap_or_default();
            prop_assert_eq!(actual, model);
        }
    }
}
