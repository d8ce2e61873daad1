//! Sticky message-group routing: the proposal/response exchange with the
//! cluster-wide grouping coordinator.
//!
//! All messages carrying the same group id and bound for the same routing
//! name must end up at the same binding, cluster-wide, for the lifetime of
//! the proposal. The bindings table proposes a binding per group; the
//! grouping handler arbitrates concurrent proposals from different nodes
//! and caches the outcome.

use serde::{Deserialize, Serialize};

/// A proposal to pin a message group to a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Full group id: `<message group id>.<routing name>`.
    pub group_id: String,
    /// Cluster name of the binding being proposed.
    pub cluster_name: String,
}

impl Proposal {
    /// Create a new proposal.
    pub fn new(group_id: impl Into<String>, cluster_name: impl Into<String>) -> Self {
        Self { group_id: group_id.into(), cluster_name: cluster_name.into() }
    }
}

/// The grouping coordinator's decision for a proposal.
///
/// An accepted proposal carries no alternative; a declined one names the
/// cluster name another node already won the group with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Full group id the decision applies to.
    pub group_id: String,
    /// Cluster name that was proposed.
    pub cluster_name: String,
    /// Cluster name to use instead, when the proposal was declined.
    pub alternative_cluster_name: Option<String>,
}

impl Response {
    /// A response accepting the proposed cluster name.
    pub fn accepted(group_id: impl Into<String>, cluster_name: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            cluster_name: cluster_name.into(),
            alternative_cluster_name: None,
        }
    }

    /// A response declining the proposal in favour of `alternative`.
    pub fn declined(
        group_id: impl Into<String>,
        cluster_name: impl Into<String>,
        alternative: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            cluster_name: cluster_name.into(),
            alternative_cluster_name: Some(alternative.into()),
        }
    }

    /// The cluster name the group is pinned to: the alternative when the
    /// proposal was declined, the proposed name otherwise.
    pub fn chosen_cluster_name(&self) -> &str {
        self.alternative_cluster_name.as_deref().unwrap_or(&self.cluster_name)
    }

    /// Whether the proposal was accepted as-is.
    pub fn is_accepted(&self) -> bool {
        self.alternative_cluster_name.is_none()
    }
}

/// The cluster-wide grouping coordinator consumed by the bindings table.
///
/// `propose` completes synchronously or times out internally; a timeout
/// surfaces as `None`, never as an error.
pub trait GroupingHandler: Send + Sync {
    /// Look up an existing decision for `full_group_id`. With `use_cache`
    /// set, a locally cached decision may be returned without a network
    /// round-trip.
    fn proposal(&self, full_group_id: &str, use_cache: bool) -> Option<Response>;

    /// Submit a proposal. Returns the coordinator's decision, or `None` on
    /// timeout.
    fn propose(&self, proposal: Proposal) -> Option<Response>;

    /// Discard a decision whose binding has disappeared.
    fn force_remove(&self, group_id: &str, cluster_name: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_response() {
        let resp = Response::accepted("g1.orders", "node-a");
        assert!(resp.is_accepted());
        assert_eq!(resp.chosen_cluster_name(), "node-a");
    }

    #[test]
    fn test_declined_response() {
        let resp = Response::declined("g1.orders", "node-a", "node-b");
        assert!(!resp.is_accepted());
        assert_eq!(resp.chosen_cluster_name(), "node-b");
    }

    #[test]
    fn test_exchange_serde_roundtrip() {
        let proposal = Proposal::new("g1.orders", "node-a");
        let json = serde_json::to_string(&proposal).unwrap();
        let parsed: Proposal = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, proposal);

        let resp = Response::declined("g1.orders", "node-a", "node-b");
        let json = serde_json::to_string(&resp).unwrap();
        let parsed: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, resp);
    }
}
