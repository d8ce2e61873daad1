//! Routing contexts: the accumulator a message carries through the
//! routing pipeline.

use crate::binding::BindingId;
use kestrel_core::Message;

/// Accumulator passed through the routing pipeline.
///
/// Bindings append their decision to the context; the post-office then
/// delivers the message to every recorded target. A context may memoize
/// its decision at a known table version and skip re-selection while the
/// binding topology is unchanged.
pub trait RoutingContext: Send {
    /// Drop all recorded routes and reset the reusability latch for a new
    /// routing pass.
    fn clear(&mut self);

    /// Hint whether the decision recorded at `version` may be inherited by
    /// later messages. Once a routing pass marks the context non-reusable,
    /// later `set_reusable(true, ..)` calls in the same pass have no
    /// effect.
    fn set_reusable(&mut self, reusable: bool, version: u32);

    /// Whether the previous decision may be inherited for `message` against
    /// a table currently at `version`.
    fn is_reusable(&self, message: &Message, version: u32) -> bool;

    /// Record a routing decision. `ack` marks targets that must confirm the
    /// transfer back to the sending cluster bridge.
    fn record_route(&mut self, binding: BindingId, ack: bool);
}

/// Standard in-memory routing context.
#[derive(Debug, Default)]
pub struct StandardRoutingContext {
    routes: Vec<(BindingId, bool)>,
    version: u32,
    reusable: Option<bool>,
}

impl StandardRoutingContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded routing decisions, in routing order.
    pub fn routes(&self) -> &[(BindingId, bool)] {
        &self.routes
    }

    /// The recorded target binding ids, in routing order.
    pub fn binding_ids(&self) -> Vec<BindingId> {
        self.routes.iter().map(|(id, _)| *id).collect()
    }

    /// The table version this context was last populated against.
    pub fn version(&self) -> u32 {
        self.version
    }
}

impl RoutingContext for StandardRoutingContext {
    fn clear(&mut self) {
        self.routes.clear();
        self.reusable = None;
    }

    fn set_reusable(&mut self, reusable: bool, version: u32) {
        self.version = version;
        // once latched non-reusable, stays non-reusable for this pass
        if self.reusable == Some(false) {
            return;
        }
        self.reusable = Some(reusable);
    }

    fn is_reusable(&self, message: &Message, version: u32) -> bool {
        // a decision spanning more than one binding is never inherited
        self.reusable == Some(true)
            && self.routes.len() == 1
            && self.version == version
            && message.group_id().is_none()
            && !message.has_route_directives()
    }

    fn record_route(&mut self, binding: BindingId, ack: bool) {
        self.routes.push((binding, ack));
    }
}
