//! Message types and utilities for the broker.

use crate::address::Address;
use crate::types::Timestamp;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Routing annotation naming remote queue ids to be translated into local
/// binding ids during a scale-down transfer. Big-endian sequence of 64-bit
/// ids; consumed by the bindings table.
pub const HDR_SCALEDOWN_TO_IDS: &str = "_KS_SCALEDOWN_TO";

/// Routing annotation carrying an explicit route directive from a cluster
/// bridge: a big-endian sequence of 64-bit local binding ids. Consumed by
/// the bindings table.
pub const HDR_ROUTE_TO_IDS: &str = "_KS_ROUTE_TO";

/// Subset of [`HDR_ROUTE_TO_IDS`] that must be routed with the
/// acknowledging variant. Same encoding.
pub const HDR_ROUTE_TO_ACK_IDS: &str = "_KS_ACK_ROUTE_TO";

/// Unique identifier for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a new unique message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a message ID from a UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Core message structure with zero-copy payload semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier
    pub id: MessageId,

    /// Destination address
    pub address: Address,

    /// Message payload (zero-copy)
    pub payload: Bytes,

    /// Message timestamp
    pub timestamp: Timestamp,

    /// Message-group identifier pinning the message to a sticky binding
    group_id: Option<String>,

    /// Optional application headers
    headers: Option<HashMap<String, String>>,

    /// Binary routing annotations, keyed by reserved names
    annotations: HashMap<String, Bytes>,
}

impl Message {
    /// Create a new message with the given address and payload.
    ///
    /// # Errors
    /// Returns an error if the address name is invalid.
    pub fn new(address: impl Into<String>, payload: Bytes) -> crate::Result<Self> {
        Ok(Self {
            id: MessageId::new(),
            address: Address::new(address)?,
            payload,
            timestamp: Utc::now(),
            group_id: None,
            headers: None,
            annotations: HashMap::new(),
        })
    }

    /// Create a message builder for more complex construction.
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Get the message identifier.
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Get the destination address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Get the payload size in bytes.
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    /// Get the message-group identifier, if any.
    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    /// Set the message-group identifier.
    pub fn set_group_id(&mut self, group_id: impl Into<String>) {
        self.group_id = Some(group_id.into());
    }

    /// Get a header value by key.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.as_ref()?.get(key).map(String::as_str)
    }

    /// Set a header value.
    pub fn set_header(&mut self, key: String, value: String) {
        self.headers.get_or_insert_with(Default::default).insert(key, value);
    }

    /// Get a binary routing annotation by key.
    pub fn annotation(&self, key: &str) -> Option<&Bytes> {
        self.annotations.get(key)
    }

    /// Set a binary routing annotation, replacing any previous value.
    pub fn put_annotation(&mut self, key: impl Into<String>, value: Bytes) {
        self.annotations.insert(key.into(), value);
    }

    /// Remove and return a binary routing annotation.
    pub fn remove_annotation(&mut self, key: &str) -> Option<Bytes> {
        self.annotations.remove(key)
    }

    /// Whether the message carries any of the reserved routing directives.
    pub fn has_route_directives(&self) -> bool {
        self.annotations.contains_key(HDR_ROUTE_TO_IDS)
            || self.annotations.contains_key(HDR_SCALEDOWN_TO_IDS)
            || self.annotations.contains_key(HDR_ROUTE_TO_ACK_IDS)
    }
}

/// Builder pattern for constructing messages.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    id: Option<MessageId>,
    address: Option<Address>,
    payload: Option<Bytes>,
    timestamp: Option<Timestamp>,
    group_id: Option<String>,
    headers: Option<HashMap<String, String>>,
    annotations: HashMap<String, Bytes>,
}

impl MessageBuilder {
    /// Set the message ID.
    pub fn id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the destination address.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        if let Ok(address) = Address::new(address) {
            self.address = Some(address);
        }
        self
    }

    /// Set the payload.
    pub fn payload(mut self, payload: Bytes) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Set the timestamp.
    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the message-group identifier.
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Add a header.
    pub fn header(mut self, key: String, value: String) -> Self {
        self.headers.get_or_insert_with(Default::default).insert(key, value);
        self
    }

    /// Add a binary routing annotation.
    pub fn annotation(mut self, key: impl Into<String>, value: Bytes) -> Self {
        self.annotations.insert(key.into(), value);
        self
    }

    /// Build the message.
    ///
    /// # Errors
    /// Returns an error if required fields are missing.
    pub fn build(self) -> crate::Result<Message> {
        let address = self.address.ok_or_else(|| crate::Error::InvalidMessage {
            message: "Address is required".to_string(),
        })?;

        let payload = self.payload.ok_or_else(|| crate::Error::InvalidMessage {
            message: "Payload is required".to_string(),
        })?;

        Ok(Message {
            id: self.id.unwrap_or_else(MessageId::new),
            address,
            payload,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            group_id: self.group_id,
            headers: self.headers,
            annotations: self.annotations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::new("orders", Bytes::from_static(b"payload")).unwrap();
        assert_eq!(msg.address().as_str(), "orders");
        assert_eq!(msg.payload_size(), 7);
        assert!(msg.group_id().is_none());
        assert!(!msg.has_route_directives());
    }

    #[test]
    fn test_annotation_roundtrip() {
        let mut msg = Message::new("orders", Bytes::new()).unwrap();
        msg.put_annotation(HDR_ROUTE_TO_IDS, Bytes::from_static(&[0, 0, 0, 0, 0, 0, 0, 7]));
        assert!(msg.has_route_directives());

        let taken = msg.remove_annotation(HDR_ROUTE_TO_IDS).unwrap();
        assert_eq!(taken.as_ref(), &[0, 0, 0, 0, 0, 0, 0, 7]);
        assert!(!msg.has_route_directives());
        assert!(msg.remove_annotation(HDR_ROUTE_TO_IDS).is_none());
    }

    #[test]
    fn test_builder() {
        let msg = Message::builder()
            .address("orders::audit")
            .payload(Bytes::from_static(b"x"))
            .group_id("g1")
            .header("color".to_string(), "red".to_string())
            .build()
            .unwrap();

        assert!(msg.address().is_fully_qualified());
        assert_eq!(msg.group_id(), Some("g1"));
        assert_eq!(msg.header("color"), Some("red"));
    }

    #[test]
    fn test_builder_missing_fields() {
        assert!(Message::builder().payload(Bytes::new()).build().is_err());
        assert!(Message::builder().address("orders").build().is_err());
    }
}
