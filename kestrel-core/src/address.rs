//! Address names and the fully-qualified queue syntax.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the address prefix and the queue part of a
/// fully-qualified queue name, e.g. `orders.incoming::audit-queue`.
pub const FQQN_SEPARATOR: &str = "::";

/// Logical destination name for message routing.
///
/// An address owns one bindings table. An address string containing
/// [`FQQN_SEPARATOR`] names a specific queue directly and bypasses
/// routing-name selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create a new address.
    ///
    /// # Errors
    /// Returns an error if the address name is empty, too long, or contains
    /// control or whitespace characters.
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::Error::InvalidAddress {
                message: "Address name cannot be empty".to_string(),
            });
        }

        if name.len() > 255 {
            return Err(crate::Error::InvalidAddress {
                message: "Address name cannot exceed 255 characters".to_string(),
            });
        }

        if name.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(crate::Error::InvalidAddress {
                message: "Address name contains invalid characters".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get the address name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this address carries an explicit queue part.
    pub fn is_fully_qualified(&self) -> bool {
        self.0.contains(FQQN_SEPARATOR)
    }

    /// The address prefix, without any queue part.
    pub fn address_part(&self) -> &str {
        match self.0.find(FQQN_SEPARATOR) {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        }
    }

    /// The queue part of a fully-qualified name, if present.
    pub fn queue_part(&self) -> Option<&str> {
        self.0
            .find(FQQN_SEPARATOR)
            .map(|idx| &self.0[idx + FQQN_SEPARATOR.len()..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_address() {
        let addr = Address::new("orders.incoming").unwrap();
        assert!(!addr.is_fully_qualified());
        assert_eq!(addr.address_part(), "orders.incoming");
        assert_eq!(addr.queue_part(), None);
    }

    #[test]
    fn test_fully_qualified_address() {
        let addr = Address::new("orders.incoming::audit").unwrap();
        assert!(addr.is_fully_qualified());
        assert_eq!(addr.address_part(), "orders.incoming");
        assert_eq!(addr.queue_part(), Some("audit"));
    }

    #[test]
    fn test_empty_queue_part() {
        let addr = Address::new("orders::").unwrap();
        assert!(addr.is_fully_qualified());
        assert_eq!(addr.queue_part(), Some(""));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(Address::new("").is_err());
        assert!(Address::new("has space").is_err());
        assert!(Address::new("x".repeat(256)).is_err());
    }
}
