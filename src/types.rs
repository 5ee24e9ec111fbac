//! Core wire types shared by every component

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier for a node in the cluster
pub type NodeId = String;

/// A document as stored and transported: a structured key-value record.
///
/// Store-native values (object ids, datetimes) are carried in extended-JSON
/// form: `{"$oid": "<hex>"}` and `{"$date": "<rfc3339>"}` (or epoch millis).
/// They are flattened to plain strings before leaving the service boundary.
pub type Document = serde_json::Map<String, Value>;

/// Kind of a node message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Command,
    Query,
    Response,
    Status,
}

/// Delivery priority of a node message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Emergency,
}

/// Envelope for all inter-node traffic.
///
/// Every command or query that expects a reply carries enough identity in
/// `source` (plus an optional `request_id` inside the payload) to route the
/// response back unambiguously, even when the reply is re-addressed to a
/// well-known endpoint rather than the arrival socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMessage {
    /// Unique message id
    pub id: String,
    /// Message kind
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Delivery priority
    #[serde(default)]
    pub priority: Priority,
    /// Originating node name
    pub source: NodeId,
    /// Destination node name
    pub destination: NodeId,
    /// Structured key-value payload
    pub payload: Value,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Whether the sender expects an acknowledgement
    #[serde(default)]
    pub requires_ack: bool,
}

impl NodeMessage {
    pub fn new(
        message_type: MessageType,
        source: impl Into<NodeId>,
        destination: impl Into<NodeId>,
        payload: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_type,
            priority: Priority::Normal,
            source: source.into(),
            destination: destination.into(),
            payload,
            timestamp: Utc::now(),
            requires_ack: false,
        }
    }

    /// Build a response to `inbound`, addressed back to its source.
    pub fn response_to(inbound: &NodeMessage, source: impl Into<NodeId>, payload: Value) -> Self {
        Self::new(MessageType::Response, source, inbound.source.clone(), payload)
    }

    /// Build a status notification addressed to the control plane.
    pub fn status(source: impl Into<NodeId>, destination: impl Into<NodeId>, payload: Value) -> Self {
        Self::new(MessageType::Status, source, destination, payload)
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ack(mut self) -> Self {
        self.requires_ack = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_new_defaults() {
        let msg = NodeMessage::new(
            MessageType::Command,
            "data_node",
            "core",
            json!({"command": "get_stats"}),
        );
        assert!(!msg.id.is_empty(), "id should be auto-generated");
        assert_eq!(msg.message_type, MessageType::Command);
        assert_eq!(msg.priority, Priority::Normal);
        assert_eq!(msg.source, "data_node");
        assert_eq!(msg.destination, "core");
        assert!(!msg.requires_ack);
    }

    #[test]
    fn test_response_to_swaps_addressing() {
        let inbound = NodeMessage::new(MessageType::Query, "core", "data_node", json!({}));
        let reply = NodeMessage::response_to(&inbound, "data_node", json!({"status": "success"}));
        assert_eq!(reply.message_type, MessageType::Response);
        assert_eq!(reply.source, "data_node");
        assert_eq!(reply.destination, "core");
        assert_ne!(reply.id, inbound.id);
    }

    #[test]
    fn test_builder_chaining() {
        let msg = NodeMessage::new(MessageType::Status, "a", "b", json!({}))
            .with_priority(Priority::High)
            .with_ack();
        assert_eq!(msg.priority, Priority::High);
        assert!(msg.requires_ack);
    }

    #[test]
    fn test_message_serialization_roundtrip() {
        let msg = NodeMessage::new(
            MessageType::Command,
            "node-a",
            "node-b",
            json!({"command": "insert_one", "collection": "telemetry"}),
        );
        let serialized = serde_json::to_string(&msg).expect("serialize NodeMessage");
        let deserialized: NodeMessage =
            serde_json::from_str(&serialized).expect("deserialize NodeMessage");
        assert_eq!(deserialized.id, msg.id);
        assert_eq!(deserialized.message_type, MessageType::Command);
        assert_eq!(deserialized.payload["collection"], "telemetry");
    }

    #[test]
    fn test_message_type_wire_names() {
        assert_eq!(serde_json::to_string(&MessageType::Command).unwrap(), "\"command\"");
        assert_eq!(serde_json::to_string(&MessageType::Status).unwrap(), "\"status\"");
        // the envelope uses "type", not "message_type"
        let msg = NodeMessage::new(MessageType::Response, "a", "b", json!({}));
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("type").is_some());
        assert!(value.get("message_type").is_none());
    }

    #[test]
    fn test_priority_defaults_when_absent() {
        let raw = json!({
            "id": "m-1",
            "type": "command",
            "source": "a",
            "destination": "b",
            "payload": {},
            "timestamp": Utc::now(),
        });
        let msg: NodeMessage = serde_json::from_value(raw).expect("deserialize without priority");
        assert_eq!(msg.priority, Priority::Normal);
        assert!(!msg.requires_ack);
    }
}
