//! Command protocol: operations, payload shapes, wire encoding.
//!
//! Inbound payloads are structured key-value documents; the `command` field
//! names one of a closed set of operations. Unknown commands fail closed
//! with a validation error instead of silently doing nothing.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ServiceError;
use crate::types::{Document, MessageType, NodeMessage};

/// Upper bound for one encoded message on the wire
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// The closed set of operations this node serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateCollection,
    DropCollection,
    GetStats,
    InsertOne,
    QueryData,
    BackupDatabase,
    RestoreDatabase,
}

impl Operation {
    pub fn parse(command: &str) -> Option<Self> {
        match command {
            "create_collection" => Some(Self::CreateCollection),
            "drop_collection" => Some(Self::DropCollection),
            "get_stats" => Some(Self::GetStats),
            "insert_one" => Some(Self::InsertOne),
            "query_data" => Some(Self::QueryData),
            "backup_database" => Some(Self::BackupDatabase),
            "restore_database" => Some(Self::RestoreDatabase),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateCollection => "create_collection",
            Self::DropCollection => "drop_collection",
            Self::GetStats => "get_stats",
            Self::InsertOne => "insert_one",
            Self::QueryData => "query_data",
            Self::BackupDatabase => "backup_database",
            Self::RestoreDatabase => "restore_database",
        }
    }

    /// Determine the operation for an inbound message.
    ///
    /// The payload's `command` field decides; a message of type `query`
    /// without one is a query. Anything else fails closed.
    pub fn resolve(message: &NodeMessage) -> Result<Self, ServiceError> {
        match message.payload.get("command").and_then(Value::as_str) {
            Some(command) => Self::parse(command).ok_or_else(|| {
                ServiceError::validation(format!("unknown command '{}'", command))
            }),
            None if message.message_type == MessageType::Query => Ok(Self::QueryData),
            None => Err(ServiceError::validation("missing 'command' parameter")),
        }
    }
}

/// Typed view of an inbound command payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandRequest {
    pub command: Option<String>,
    pub collection: Option<String>,
    pub data: Option<Document>,
    pub query: Option<Document>,
    pub sort: Option<Vec<(String, i64)>>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
    pub request_id: Option<String>,
    pub backup_name: Option<String>,
}

impl CommandRequest {
    /// Parse the raw payload. A non-object payload or a field of the wrong
    /// type is the caller's mistake, not ours.
    pub fn from_payload(payload: &Value) -> Result<Self, ServiceError> {
        if !payload.is_object() {
            return Err(ServiceError::validation("payload must be an object"));
        }
        serde_json::from_value(payload.clone())
            .map_err(|e| ServiceError::validation(format!("malformed payload: {}", e)))
    }

    pub fn require_collection(&self) -> Result<&str, ServiceError> {
        match self.collection.as_deref() {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(ServiceError::validation("missing 'collection' parameter")),
        }
    }

    pub fn require_data(&self) -> Result<Document, ServiceError> {
        self.data
            .clone()
            .ok_or_else(|| ServiceError::validation("missing 'data' parameter"))
    }

    pub fn require_backup_name(&self) -> Result<&str, ServiceError> {
        match self.backup_name.as_deref() {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(ServiceError::validation("missing 'backup_name' parameter")),
        }
    }
}

/// Pull `request_id` straight out of a raw payload.
///
/// Kept separate from the typed parse so even a malformed request still gets
/// its correlation id echoed back.
pub fn request_id_of(payload: &Value) -> Option<String> {
    payload
        .get("request_id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Build a success response payload: operation fields plus `status` and the
/// echoed `request_id` (present exactly when the caller supplied one).
pub fn success_payload(fields: Value, request_id: Option<&str>) -> Value {
    let mut map = match fields {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };
    map.insert("status".to_string(), Value::String("success".to_string()));
    if let Some(id) = request_id {
        map.insert("request_id".to_string(), Value::String(id.to_string()));
    }
    Value::Object(map)
}

/// Build an error response payload carrying the taxonomy kind and a
/// human-readable message.
pub fn error_payload(error: &ServiceError, request_id: Option<&str>) -> Value {
    let mut map = Map::new();
    map.insert("status".to_string(), Value::String("error".to_string()));
    map.insert(
        "error_type".to_string(),
        Value::String(error.kind().to_string()),
    );
    map.insert("message".to_string(), Value::String(error.to_string()));
    if let Some(id) = request_id {
        map.insert("request_id".to_string(), Value::String(id.to_string()));
    }
    Value::Object(map)
}

/// Encode a message for the wire.
pub fn encode_message(message: &NodeMessage) -> anyhow::Result<Vec<u8>> {
    let bytes = serde_json::to_vec(message)?;
    if bytes.len() > MAX_MESSAGE_SIZE {
        anyhow::bail!("message too large: {} bytes", bytes.len());
    }
    Ok(bytes)
}

/// Decode a message from the wire.
pub fn decode_message(bytes: &[u8]) -> anyhow::Result<NodeMessage> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        anyhow::bail!("message too large: {} bytes", bytes.len());
    }
    Ok(serde_json::from_slice(bytes)?)
}
