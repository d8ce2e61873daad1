//! Test doubles for exercising the routing core.
//!
//! Used by the crate's own tests and by downstream crates that need a
//! scriptable binding or grouping coordinator without standing up real
//! queues.

use crate::binding::{Binding, BindingId, BindingKind, Queue};
use crate::context::RoutingContext;
use crate::grouping::{GroupingHandler, Proposal, Response};
use kestrel_core::{Filter, Message, MessageId, MessageLoadBalancing};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A scriptable binding that records every message routed through it.
pub struct TestBinding {
    id: BindingId,
    unique_name: String,
    routing_name: String,
    cluster_name: String,
    kind: BindingKind,
    exclusive: bool,
    connected: AtomicBool,
    high_priority: AtomicBool,
    failing: bool,
    local_queue_id: Option<u64>,
    filter: Option<Arc<dyn Filter>>,
    routed: Mutex<Vec<(MessageId, bool)>>,
    unproposed: Mutex<Vec<String>>,
}

impl TestBinding {
    fn base(id: u64, unique_name: &str, kind: BindingKind, local_queue_id: Option<u64>) -> Self {
        Self {
            id: BindingId::new(id),
            unique_name: unique_name.to_string(),
            routing_name: unique_name.to_string(),
            cluster_name: unique_name.to_string(),
            kind,
            exclusive: false,
            connected: AtomicBool::new(true),
            high_priority: AtomicBool::new(true),
            failing: false,
            local_queue_id,
            filter: None,
            routed: Mutex::new(Vec::new()),
            unproposed: Mutex::new(Vec::new()),
        }
    }

    /// A binding for a queue hosted on this node. Routing name, cluster
    /// name and queue id default to the unique name and binding id.
    pub fn local(id: u64, unique_name: &str) -> Self {
        Self::base(id, unique_name, BindingKind::LocalQueue, Some(id))
    }

    /// A binding for a queue hosted by a cluster peer.
    pub fn remote(
        id: u64,
        unique_name: &str,
        remote_queue_id: u64,
        load_balancing: MessageLoadBalancing,
    ) -> Self {
        Self::base(
            id,
            unique_name,
            BindingKind::RemoteQueue { remote_queue_id, load_balancing },
            None,
        )
    }

    /// A divert binding.
    pub fn divert(id: u64, unique_name: &str) -> Self {
        Self::base(id, unique_name, BindingKind::Divert, None)
    }

    /// Override the routing name.
    pub fn with_routing_name(mut self, routing_name: &str) -> Self {
        self.routing_name = routing_name.to_string();
        self
    }

    /// Override the cluster name.
    pub fn with_cluster_name(mut self, cluster_name: &str) -> Self {
        self.cluster_name = cluster_name.to_string();
        self
    }

    /// Attach a filter.
    pub fn with_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Override the local queue id.
    pub fn with_local_queue_id(mut self, queue_id: u64) -> Self {
        self.local_queue_id = Some(queue_id);
        self
    }

    /// Mark the binding exclusive.
    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    /// Set the initial connectedness.
    pub fn connected(self, connected: bool) -> Self {
        self.connected.store(connected, Ordering::Relaxed);
        self
    }

    /// Set the initial accept priority.
    pub fn high_priority(self, high_priority: bool) -> Self {
        self.high_priority.store(high_priority, Ordering::Relaxed);
        self
    }

    /// Make every delivery through this binding fail.
    pub fn failing_delivery(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Toggle connectedness after construction.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Toggle accept priority after construction.
    pub fn set_high_priority(&self, high_priority: bool) {
        self.high_priority.store(high_priority, Ordering::Relaxed);
    }

    /// Every message routed through this binding, with its ack flag.
    pub fn routed(&self) -> Vec<(MessageId, bool)> {
        self.routed.lock().clone()
    }

    /// How many messages were routed through this binding.
    pub fn routed_count(&self) -> usize {
        self.routed.lock().len()
    }

    /// Group ids this binding was told were unproposed.
    pub fn unproposed_groups(&self) -> Vec<String> {
        self.unproposed.lock().clone()
    }

    fn deliver(
        &self,
        message: &Message,
        context: &mut dyn RoutingContext,
        ack: bool,
    ) -> crate::Result<()> {
        if self.failing {
            return Err(crate::Error::Delivery {
                binding: self.id,
                message: "scripted delivery failure".to_string(),
            });
        }
        self.routed.lock().push((message.id(), ack));
        context.record_route(self.id, ack);
        Ok(())
    }
}

impl Binding for TestBinding {
    fn id(&self) -> BindingId {
        self.id
    }

    fn unique_name(&self) -> &str {
        &self.unique_name
    }

    fn routing_name(&self) -> &str {
        &self.routing_name
    }

    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    fn filter(&self) -> Option<&dyn Filter> {
        self.filter.as_deref()
    }

    fn kind(&self) -> BindingKind {
        self.kind
    }

    fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn is_high_accept_priority(&self, _message: &Message) -> bool {
        self.high_priority.load(Ordering::Relaxed)
    }

    fn local_queue_id(&self) -> Option<u64> {
        self.local_queue_id
    }

    fn route(&self, message: &Message, context: &mut dyn RoutingContext) -> crate::Result<()> {
        self.deliver(message, context, false)
    }

    fn route_with_ack(
        &self,
        message: &Message,
        context: &mut dyn RoutingContext,
    ) -> crate::Result<()> {
        self.deliver(message, context, true)
    }

    fn unproposed(&self, group_id: &str) {
        self.unproposed.lock().push(group_id.to_string());
    }
}

impl fmt::Debug for TestBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestBinding")
            .field("id", &self.id)
            .field("unique_name", &self.unique_name)
            .field("routing_name", &self.routing_name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A filter matching messages whose header `key` equals `value`.
#[derive(Debug)]
pub struct HeaderFilter {
    key: String,
    value: String,
}

impl HeaderFilter {
    /// Create a filter on the given header.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

impl Filter for HeaderFilter {
    fn matches(&self, message: &Message) -> bool {
        message.header(&self.key) == Some(self.value.as_str())
    }
}

/// A queue handle for redistribution tests.
pub struct TestQueue {
    id: u64,
    name: String,
}

impl TestQueue {
    /// Create a queue handle.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

impl Queue for TestQueue {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// How a [`ScriptedGroupingHandler`] answers proposals.
#[derive(Debug, Clone)]
pub enum GroupingScript {
    /// Accept the first proposal per group and cache it.
    AcceptFirst,
    /// Decline every proposal in favour of the named cluster name.
    DeclineWith(String),
    /// Time out on every proposal.
    Timeout,
}

/// An in-process grouping coordinator driven by a [`GroupingScript`].
pub struct ScriptedGroupingHandler {
    script: Mutex<GroupingScript>,
    cache: Mutex<HashMap<String, Response>>,
    proposals: Mutex<Vec<Proposal>>,
    force_removed: Mutex<Vec<(String, String)>>,
}

impl ScriptedGroupingHandler {
    /// Create a handler with the given script.
    pub fn new(script: GroupingScript) -> Self {
        Self {
            script: Mutex::new(script),
            cache: Mutex::new(HashMap::new()),
            proposals: Mutex::new(Vec::new()),
            force_removed: Mutex::new(Vec::new()),
        }
    }

    /// Replace the script mid-test.
    pub fn set_script(&self, script: GroupingScript) {
        *self.script.lock() = script;
    }

    /// Every proposal submitted so far.
    pub fn proposals(&self) -> Vec<Proposal> {
        self.proposals.lock().clone()
    }

    /// Every `(group id, cluster name)` pair force-removed so far.
    pub fn force_removals(&self) -> Vec<(String, String)> {
        self.force_removed.lock().clone()
    }

    /// The cached decision for a full group id, if any.
    pub fn cached(&self, full_group_id: &str) -> Option<Response> {
        self.cache.lock().get(full_group_id).cloned()
    }
}

impl GroupingHandler for ScriptedGroupingHandler {
    fn proposal(&self, full_group_id: &str, _use_cache: bool) -> Option<Response> {
        self.cache.lock().get(full_group_id).cloned()
    }

    fn propose(&self, proposal: Proposal) -> Option<Response> {
        self.proposals.lock().push(proposal.clone());

        let script = self.script.lock().clone();
        match script {
            GroupingScript::AcceptFirst => {
                let response = Response::accepted(proposal.group_id.clone(), proposal.cluster_name);
                self.cache.lock().insert(proposal.group_id, response.clone());
                Some(response)
            }
            GroupingScript::DeclineWith(alternative) => {
                let response = Response::declined(
                    proposal.group_id.clone(),
                    proposal.cluster_name,
                    alternative,
                );
                self.cache.lock().insert(proposal.group_id, response.clone());
                Some(response)
            }
            GroupingScript::Timeout => None,
        }
    }

    fn force_remove(&self, group_id: &str, cluster_name: &str) {
        self.force_removed.lock().push((group_id.to_string(), cluster_name.to_string()));
        self.cache.lock().remove(group_id);
    }
}
