//! The per-address bindings table.
//!
//! One [`AddressBindings`] exists per address and decides, for each inbound
//! message, which bindings receive a copy. The table keeps three registries
//! (by id, by unique name, and the exclusive set) plus the routing-name
//! index, and dispatches each message down one of the routing paths:
//! reusable context, explicit cluster directive, sticky group routing,
//! fully-qualified lookup, or plain round-robin.

use crate::binding::{decode_id_list, encode_id_list, Binding, BindingId, Queue};
use crate::context::RoutingContext;
use crate::grouping::{GroupingHandler, Proposal, Response};
use crate::index::RoutingNameIndex;
use crate::selector;
use bytes::Bytes;
use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use kestrel_core::message::{HDR_ROUTE_TO_ACK_IDS, HDR_ROUTE_TO_IDS, HDR_SCALEDOWN_TO_IDS};
use kestrel_core::{Message, MessageLoadBalancing, RoutingConfig};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// How many times grouped routing retries after a proposal refers to a
/// binding that has since disappeared, before falling back to plain
/// round-robin. Public for test assertions.
pub const MAX_GROUP_RETRY: u32 = 10;

/// Process-wide source for table versions. Shared across every table so a
/// routing context passing between tables can never collide on a version
/// number. Overflow wraps; versions are only compared for equality.
static SEQUENCE_VERSION: AtomicU32 = AtomicU32::new(0);

fn next_version() -> u32 {
    SEQUENCE_VERSION.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
}

/// The table of bindings attached to one address.
///
/// All methods are safe for concurrent invocation: `route` and
/// `redistribute` run on broker I/O threads while `add`, `remove` and
/// queue updates arrive from management or cluster-topology threads.
pub struct AddressBindings {
    name: String,
    by_id: DashMap<BindingId, Arc<dyn Binding>>,
    by_unique_name: DashMap<String, Arc<dyn Binding>>,
    exclusive: RwLock<Arc<[Arc<dyn Binding>]>>,
    routing_index: RoutingNameIndex,
    load_balancing: AtomicCell<MessageLoadBalancing>,
    grouping: Option<Arc<dyn GroupingHandler>>,
    version: AtomicU32,
}

impl AddressBindings {
    /// Create an empty table for the named address.
    pub fn new(name: impl Into<String>, grouping: Option<Arc<dyn GroupingHandler>>) -> Self {
        Self {
            name: name.into(),
            by_id: DashMap::new(),
            by_unique_name: DashMap::new(),
            exclusive: RwLock::new(Vec::new().into()),
            routing_index: RoutingNameIndex::new(),
            load_balancing: AtomicCell::new(MessageLoadBalancing::Off),
            grouping,
            version: AtomicU32::new(next_version()),
        }
    }

    /// Create a table seeded from configuration.
    pub fn with_config(
        name: impl Into<String>,
        config: &RoutingConfig,
        grouping: Option<Arc<dyn GroupingHandler>>,
    ) -> Self {
        let grouping = if config.grouping_enabled { grouping } else { None };
        let table = Self::new(name, grouping);
        table.set_load_balancing(config.message_load_balancing);
        table
    }

    /// The address this table belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The table version, advanced by every successful mutation.
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    /// The current load-balancing policy.
    pub fn load_balancing(&self) -> MessageLoadBalancing {
        self.load_balancing.load()
    }

    /// Replace the load-balancing policy. Concurrent routes may observe
    /// the old or new policy.
    pub fn set_load_balancing(&self, load_balancing: MessageLoadBalancing) {
        self.load_balancing.store(load_balancing);
    }

    /// Whether queues under this table may offload undelivered messages to
    /// a peer binding.
    pub fn allow_redistribute(&self) -> bool {
        self.load_balancing.load().allows_redistribution()
    }

    /// Every binding currently registered, in unspecified order.
    pub fn bindings(&self) -> Vec<Arc<dyn Binding>> {
        self.by_id.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Insert a binding.
    ///
    /// Exclusive bindings go to the exclusive set, everything else joins
    /// its routing group. A remote-queue binding overwrites the table's
    /// load-balancing policy with the one the peer advertises. Always
    /// advances the version.
    pub fn add(&self, binding: Arc<dyn Binding>) {
        trace!(table = %self.name, binding = ?binding, "adding binding");

        if binding.is_exclusive() {
            self.add_exclusive(binding.clone());
        } else {
            self.routing_index.add(binding.clone());
        }

        self.by_id.insert(binding.id(), binding.clone());
        self.by_unique_name.insert(binding.unique_name().to_string(), binding.clone());

        if let crate::binding::BindingKind::RemoteQueue { load_balancing, .. } = binding.kind() {
            self.set_load_balancing(load_balancing);
        }

        self.touch();
    }

    /// Remove a binding by its unique name, returning it. Advances the
    /// version only when the name was present.
    pub fn remove_by_unique_name(&self, unique_name: &str) -> Option<Arc<dyn Binding>> {
        let (_, binding) = self.by_unique_name.remove(unique_name)?;

        if binding.is_exclusive() {
            self.remove_exclusive(binding.as_ref());
        } else {
            self.routing_index.remove(binding.as_ref());
        }
        self.by_id.remove(&binding.id());

        trace!(table = %self.name, binding = ?binding, "removed binding");
        self.touch();
        Some(binding)
    }

    /// Notification that a queue behind one of the bindings changed in a
    /// way that affects routing decisions (consumers attached or detached,
    /// filter updated). No structural change; advances the version so
    /// cached routing contexts re-select.
    pub fn on_queue_updated(&self, _binding: &dyn Binding) {
        self.touch();
    }

    /// Notify every binding that a grouping proposal has been cleared.
    pub fn unproposed(&self, group_id: &str) {
        for entry in self.by_id.iter() {
            entry.value().unproposed(group_id);
        }
    }

    /// Dispatch a message to the bindings that should receive it.
    ///
    /// # Errors
    /// Propagates delivery errors from the bindings unchanged.
    pub fn route(
        &self,
        message: &mut Message,
        context: &mut dyn RoutingContext,
    ) -> crate::Result<()> {
        self.route_internal(message, context, true)
    }

    /// A queue that failed to deliver asks to offload the message to a
    /// peer binding of the same routing group. Returns whether a peer
    /// accepted it.
    ///
    /// # Errors
    /// Propagates delivery errors from the chosen binding unchanged.
    pub fn redistribute(
        &self,
        message: &Message,
        origin: &dyn Queue,
        context: &mut dyn RoutingContext,
    ) -> crate::Result<bool> {
        let load_balancing = self.load_balancing.load();
        if !load_balancing.allows_redistribution() {
            return Ok(false);
        }

        trace!(table = %self.name, message = %message.id(), "redistributing message");

        // the group can be concurrently removed while we look; treat that
        // as no eligible peer
        let Some((bindings, cursor)) = self.routing_index.get(origin.name()) else {
            return Ok(false);
        };

        let count = bindings.len();
        let mut position = cursor.position() as usize;
        if position >= count {
            position = 0;
        }

        let mut target: Option<Arc<dyn Binding>> = None;
        for _ in 0..count {
            let binding = &bindings[position];
            position = selector::advance(position, count);

            let is_origin = binding.local_queue_id() == Some(origin.id());
            let matches = binding.filter().map_or(true, |f| f.matches(message));
            if binding.is_high_accept_priority(message) && !is_origin && matches {
                target = Some(binding.clone());
                break;
            }
        }

        match target {
            Some(binding) => {
                cursor.set_position(position as u32);
                binding.route(message, context)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Human-readable dump of all three registries.
    pub fn debug_bindings(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "\n**************************************************");

        let _ = writeln!(out, "routing name index:");
        let groups = self.routing_index.snapshot();
        if groups.is_empty() {
            let _ = writeln!(out, "\tEMPTY!");
        }
        for (routing_name, bindings, cursor) in groups {
            let _ = writeln!(
                out,
                "\tkey={routing_name},\tposition={}\tvalue(s):",
                cursor.position()
            );
            for binding in bindings.iter() {
                let _ = writeln!(out, "\t\t{binding:?}");
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "bindings by id:");
        if self.by_id.is_empty() {
            let _ = writeln!(out, "\tEMPTY!");
        }
        for entry in self.by_id.iter() {
            let _ = writeln!(out, "\tkey={}, value={:?}", entry.key(), entry.value());
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "exclusive bindings:");
        let exclusives = self.exclusive_snapshot();
        if exclusives.is_empty() {
            let _ = writeln!(out, "\tEMPTY!");
        }
        for binding in exclusives.iter() {
            let _ = writeln!(out, "\t{binding:?}");
        }

        let _ = writeln!(out, "####################################################");
        out
    }

    fn touch(&self) {
        self.version.store(next_version(), Ordering::Release);
    }

    fn exclusive_snapshot(&self) -> Arc<[Arc<dyn Binding>]> {
        self.exclusive.read().clone()
    }

    fn add_exclusive(&self, binding: Arc<dyn Binding>) {
        let mut guard = self.exclusive.write();
        if guard.iter().any(|b| b.id() == binding.id()) {
            return;
        }
        let mut next = guard.to_vec();
        next.push(binding);
        *guard = next.into();
    }

    fn remove_exclusive(&self, binding: &dyn Binding) {
        let mut guard = self.exclusive.write();
        let next: Vec<Arc<dyn Binding>> =
            guard.iter().filter(|b| b.id() != binding.id()).cloned().collect();
        *guard = next.into();
    }

    fn route_internal(
        &self,
        message: &mut Message,
        context: &mut dyn RoutingContext,
        group_routing: bool,
    ) -> crate::Result<()> {
        let current_version = self.version();
        let reusable = context.is_reusable(message, current_version);
        if !reusable {
            context.clear();
        }

        // scale-down sidechannel: translate remote queue ids into an
        // explicit local route directive before anything else sees them
        if let Some(ids) = message.remove_annotation(HDR_SCALEDOWN_TO_IDS) {
            self.translate_scaledown_ids(message, &ids);
        }

        let exclusives = self.exclusive_snapshot();
        let routed = if exclusives.is_empty() {
            false
        } else {
            self.route_to_exclusive(message, context, &exclusives, current_version)?
        };
        if routed {
            return Ok(());
        }

        let grouping = if group_routing { self.grouping.as_ref() } else { None };

        if let Some(route_to) = message.remove_annotation(HDR_ROUTE_TO_IDS) {
            context.clear();
            context.set_reusable(false, current_version);
            self.route_from_cluster(message, context, &route_to)?;
        } else if let (Some(handler), Some(group_id)) =
            (grouping, message.group_id().map(str::to_owned))
        {
            let handler = handler.clone();
            context.clear();
            context.set_reusable(false, current_version);
            self.route_with_grouping(message, context, &handler, &group_id, 0)?;
        } else if message.address().is_fully_qualified() {
            context.clear();
            context.set_reusable(false, current_version);
            // an unknown queue part drops the message for this path; there
            // is no exclusive or grouped fallback
            let target = message
                .address()
                .queue_part()
                .and_then(|queue| self.by_unique_name.get(queue).map(|e| e.value().clone()));
            if let Some(binding) = target {
                binding.route(message, context)?;
            }
        } else if !reusable {
            self.simple_route(message, context, current_version)?;
        }

        Ok(())
    }

    fn route_to_exclusive(
        &self,
        message: &Message,
        context: &mut dyn RoutingContext,
        exclusives: &[Arc<dyn Binding>],
        current_version: u32,
    ) -> crate::Result<bool> {
        context.clear();
        context.set_reusable(false, current_version);

        let mut routed = false;
        for binding in exclusives {
            if binding.filter().map_or(true, |f| f.matches(message)) {
                binding.route(message, context)?;
                routed = true;
            }
        }
        Ok(routed)
    }

    fn translate_scaledown_ids(&self, message: &mut Message, ids: &Bytes) {
        let mut translated = Vec::new();
        for remote_id in decode_id_list(ids) {
            for entry in self.by_id.iter() {
                if let crate::binding::BindingKind::RemoteQueue { remote_queue_id, .. } =
                    entry.value().kind()
                {
                    if remote_queue_id == remote_id {
                        translated.push(entry.value().id().as_u64());
                    }
                }
            }
        }
        if !translated.is_empty() {
            message.put_annotation(HDR_ROUTE_TO_IDS, encode_id_list(&translated));
        }
    }

    fn route_from_cluster(
        &self,
        message: &mut Message,
        context: &mut dyn RoutingContext,
        route_to: &Bytes,
    ) -> crate::Result<()> {
        let ack_ids = message
            .remove_annotation(HDR_ROUTE_TO_ACK_IDS)
            .map(|ids| decode_id_list(&ids))
            .unwrap_or_default();

        for id in decode_id_list(route_to) {
            let binding = self.by_id.get(&BindingId::new(id)).map(|e| e.value().clone());
            match binding {
                Some(binding) => {
                    if ack_ids.contains(&id) {
                        binding.route_with_ack(message, context)?;
                    } else {
                        binding.route(message, context)?;
                    }
                }
                None => {
                    warn!(
                        table = %self.name,
                        binding = id,
                        message = %message.id(),
                        "route directive names an unknown binding; skipping it"
                    );
                }
            }
        }
        Ok(())
    }

    fn simple_route(
        &self,
        message: &Message,
        context: &mut dyn RoutingContext,
        current_version: u32,
    ) -> crate::Result<()> {
        trace!(table = %self.name, message = %message.id(), "routing message");

        let load_balancing = self.load_balancing.load();
        for (_, bindings, cursor) in self.routing_index.snapshot() {
            let next = selector::select(message, &bindings, &cursor, load_balancing);

            // the decision is repeatable only for a lone, unfiltered,
            // local binding; anything else must re-select per message
            match &next {
                Some(binding)
                    if bindings.len() == 1 && binding.filter().is_none() && binding.is_local() =>
                {
                    context.set_reusable(true, current_version);
                }
                _ => context.set_reusable(false, current_version),
            }

            if let Some(binding) = next {
                binding.route(message, context)?;
            }
        }
        Ok(())
    }

    fn route_with_grouping(
        &self,
        message: &mut Message,
        context: &mut dyn RoutingContext,
        handler: &Arc<dyn GroupingHandler>,
        group_id: &str,
        tries: u32,
    ) -> crate::Result<()> {
        let load_balancing = self.load_balancing.load();

        for (routing_name, bindings, cursor) in self.routing_index.snapshot() {
            // the full id keys the proposal per routing group, so an
            // address with several groups pins each independently
            let full_id = format!("{group_id}.{routing_name}");

            let (response, chosen) = match handler.proposal(&full_id, true) {
                Some(response) => {
                    let chosen = locate_by_cluster_name(response.chosen_cluster_name(), &bindings);
                    (Some(response), chosen)
                }
                None => {
                    let Some(candidate) =
                        selector::select(message, &bindings, &cursor, load_balancing)
                    else {
                        continue;
                    };

                    match handler.propose(Proposal::new(&full_id, candidate.cluster_name())) {
                        None => {
                            debug!(
                                table = %self.name,
                                group = %full_id,
                                tries,
                                "group proposal timed out, retrying"
                            );
                            (None, None)
                        }
                        Some(response) => {
                            // a declined proposal means another node won the
                            // group while we looked; follow its choice
                            let chosen = match response.alternative_cluster_name.as_deref() {
                                Some(alternative) => {
                                    locate_by_cluster_name(alternative, &bindings)
                                }
                                None => Some(candidate),
                            };
                            (Some(response), chosen)
                        }
                    }
                }
            };

            match chosen {
                Some(binding) => binding.route(message, context)?,
                None => return self.retry_grouped_route(message, context, handler, response, group_id, tries),
            }
        }
        Ok(())
    }

    /// The proposal refers to a binding that has since disappeared, or the
    /// exchange timed out. Discard the stale decision and retry the whole
    /// grouped routing; a concurrent add or remove may have intervened.
    fn retry_grouped_route(
        &self,
        message: &mut Message,
        context: &mut dyn RoutingContext,
        handler: &Arc<dyn GroupingHandler>,
        response: Option<Response>,
        group_id: &str,
        tries: u32,
    ) -> crate::Result<()> {
        if let Some(response) = &response {
            handler.force_remove(&response.group_id, &response.cluster_name);
        }

        if tries < MAX_GROUP_RETRY {
            self.route_with_grouping(message, context, handler, group_id, tries + 1)
        } else {
            warn!(
                table = %self.name,
                group = group_id,
                message = %message.id(),
                "unable to route message under grouped ordering; falling back to round-robin"
            );
            self.route_internal(message, context, false)
        }
    }
}

fn locate_by_cluster_name(
    cluster_name: &str,
    bindings: &[Arc<dyn Binding>],
) -> Option<Arc<dyn Binding>> {
    bindings.iter().find(|b| b.cluster_name() == cluster_name).cloned()
}

impl fmt::Debug for AddressBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressBindings")
            .field("name", &self.name)
            .field("version", &self.version())
            .field("load_balancing", &self.load_balancing.load())
            .finish_non_exhaustive()
    }
}
