//! Configuration schema for the routing core.

use crate::types::MessageLoadBalancing;
use serde::{Deserialize, Serialize};

/// Per-address routing configuration.
///
/// Loaded as part of the broker configuration tree; every field has a
/// default so partial configuration files deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RoutingConfig {
    /// Load-balancing policy applied across bindings sharing a routing name.
    pub message_load_balancing: MessageLoadBalancing,

    /// Whether sticky message-group routing is enabled for this address.
    pub grouping_enabled: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            message_load_balancing: MessageLoadBalancing::Off,
            grouping_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RoutingConfig::default();
        assert_eq!(config.message_load_balancing, MessageLoadBalancing::Off);
        assert!(config.grouping_enabled);
    }

    #[test]
    fn test_partial_deserialization() {
        let config: RoutingConfig =
            serde_json::from_str(r#"{"message-load-balancing": "on-demand"}"#).unwrap();
        assert_eq!(config.message_load_balancing, MessageLoadBalancing::OnDemand);
        assert!(config.grouping_enabled);
    }
}
