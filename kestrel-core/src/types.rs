//! Fundamental data types shared across the broker.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Message timestamp type.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Load-balancing policy applied when an address has multiple bindings
/// sharing a routing name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageLoadBalancing {
    /// Never route to peer-cluster bindings.
    Off,
    /// Round-robin across all bindings, local consumers or not.
    Strict,
    /// Prefer bindings with consumers; keep messages local when possible.
    OnDemand,
    /// Like [`MessageLoadBalancing::Off`] for normal routing, but allow
    /// queues to offload undelivered messages to peers.
    OffWithRedistribution,
}

impl MessageLoadBalancing {
    /// Whether queues under this policy may offload undelivered messages
    /// to a peer binding.
    pub fn allows_redistribution(self) -> bool {
        matches!(self, Self::OnDemand | Self::OffWithRedistribution)
    }
}

impl Default for MessageLoadBalancing {
    fn default() -> Self {
        Self::Off
    }
}

impl Display for MessageLoadBalancing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Strict => write!(f, "strict"),
            Self::OnDemand => write!(f, "on-demand"),
            Self::OffWithRedistribution => write!(f, "off-with-redistribution"),
        }
    }
}
