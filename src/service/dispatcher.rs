//! Command dispatch.
//!
//! Takes a decoded inbound message plus its origin address, validates the
//! request, runs the operation, and always answers with a response message:
//! `status: success` with operation fields, or `status: error` with the
//! error taxonomy. Caller-supplied `request_id` values are echoed back
//! whenever present, including for requests too malformed to parse, so
//! callers issuing many concurrent requests can correlate replies.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::service::backup::BackupManager;
use crate::service::protocol::{
    error_payload, request_id_of, success_payload, CommandRequest, Operation,
};
use crate::service::query::QueryExecutor;
use crate::service::router::ResponseRouter;
use crate::store::{StoreAdapter, TtlReconciler};
use crate::types::{NodeId, NodeMessage};

/// Routes validated commands to the owning component
pub struct CommandDispatcher {
    node_name: NodeId,
    adapter: Arc<StoreAdapter>,
    reconciler: Arc<TtlReconciler>,
    query: QueryExecutor,
    backup: Arc<BackupManager>,
    router: ResponseRouter,
}

impl CommandDispatcher {
    pub fn new(
        node_name: impl Into<NodeId>,
        adapter: Arc<StoreAdapter>,
        reconciler: Arc<TtlReconciler>,
        backup: Arc<BackupManager>,
        router: ResponseRouter,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            query: QueryExecutor::new(adapter.clone()),
            adapter,
            reconciler,
            backup,
            router,
        }
    }

    /// Handle one inbound message end to end: execute, then respond.
    pub async fn dispatch(&self, message: NodeMessage, origin: SocketAddr) {
        let request_id = request_id_of(&message.payload);

        let payload = match self.execute(&message).await {
            Ok(fields) => success_payload(fields, request_id.as_deref()),
            Err(e) => {
                debug!("Request from '{}' failed ({}): {}", message.source, e.kind(), e);
                error_payload(&e, request_id.as_deref())
            }
        };

        let response = NodeMessage::response_to(&message, self.node_name.clone(), payload);
        self.router.deliver(&response, origin).await;
    }

    /// Run the operation named by the message, returning its response fields.
    pub async fn execute(&self, message: &NodeMessage) -> Result<Value, ServiceError> {
        let operation = Operation::resolve(message)?;
        let request = CommandRequest::from_payload(&message.payload)?;
        debug!("Executing '{}' for '{}'", operation.as_str(), message.source);

        match operation {
            Operation::CreateCollection => self.create_collection(&request).await,
            Operation::DropCollection => self.drop_collection(&request).await,
            Operation::GetStats => self.get_stats().await,
            Operation::InsertOne => self.insert_one(&request).await,
            Operation::QueryData => self.query.execute(&request).await,
            Operation::BackupDatabase => self.backup_database().await,
            Operation::RestoreDatabase => self.restore_database(&request).await,
        }
    }

    /// Idempotent: the collection ends up existing with a policy-matching
    /// TTL index, whether or not it was already there.
    async fn create_collection(&self, request: &CommandRequest) -> Result<Value, ServiceError> {
        let collection = request.require_collection()?;
        self.adapter.create_collection(collection).await?;
        if !self.reconciler.ensure(collection).await {
            warn!(
                "Collection '{}' created without a guaranteed TTL index",
                collection
            );
        }
        Ok(json!({ "collection": collection }))
    }

    async fn drop_collection(&self, request: &CommandRequest) -> Result<Value, ServiceError> {
        let collection = request.require_collection()?;
        self.adapter.drop_collection(collection).await?;
        Ok(json!({ "collection": collection }))
    }

    async fn get_stats(&self) -> Result<Value, ServiceError> {
        let collections = self.adapter.list_collections().await?;

        let mut entries = Vec::with_capacity(collections.len());
        let mut total_documents: u64 = 0;
        for collection in &collections {
            let document_count = self.adapter.count_documents(collection).await?;
            total_documents += document_count;
            let ttl_index = self
                .adapter
                .ttl_index(collection)
                .await?
                .map(|index| json!({ "field": index.field, "expire_after_seconds": index.expire_after_secs }));
            entries.push(json!({
                "name": collection,
                "document_count": document_count,
                "ttl_index": ttl_index,
            }));
        }

        Ok(json!({
            "collection_count": collections.len(),
            "total_document_count": total_documents,
            "collections": entries,
        }))
    }

    /// TTL reconciliation runs first but never blocks the write: a failed
    /// ensure is logged and the insert proceeds without a guaranteed expiry.
    async fn insert_one(&self, request: &CommandRequest) -> Result<Value, ServiceError> {
        let collection = request.require_collection()?.to_string();
        let data = request.require_data()?;
        self.adapter.ensure_connected()?;

        if !self.reconciler.ensure(&collection).await {
            warn!(
                "Inserting into '{}' without a guaranteed TTL index",
                collection
            );
        }

        let inserted_id = self.adapter.insert_one(&collection, data).await?;
        Ok(json!({ "collection": collection, "inserted_id": inserted_id }))
    }

    async fn backup_database(&self) -> Result<Value, ServiceError> {
        let report = self.backup.run_backup().await?;
        Ok(json!({
            "backup_name": report.name,
            "collections": report.collections,
        }))
    }

    async fn restore_database(&self, request: &CommandRequest) -> Result<Value, ServiceError> {
        let name = request.require_backup_name()?;
        let report = self.backup.run_restore(name).await?;
        Ok(json!({
            "backup_name": report.name,
            "collections_restored": report.collections_restored,
            "documents_restored": report.documents_restored,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackupConfig, ControlPlaneConfig, StoreConfig};
    use crate::store::MemoryEngine;
    use crate::transport::LoopbackTransport;
    use crate::types::MessageType;
    use futures::future::join_all;
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        dispatcher: Arc<CommandDispatcher>,
        adapter: Arc<StoreAdapter>,
        peer_rx: UnboundedReceiver<(NodeMessage, SocketAddr)>,
        _dir: TempDir,
    }

    async fn fixture(connect: bool) -> Fixture {
        let adapter = Arc::new(StoreAdapter::new(
            Arc::new(MemoryEngine::new()),
            &StoreConfig::default(),
        ));
        if connect {
            adapter.connect().await.unwrap();
        }

        let dir = TempDir::new().unwrap();
        let backup_config = BackupConfig {
            enabled: true,
            interval_secs: 3600,
            dir: dir.path().to_path_buf(),
        };
        let (transport, peer_rx, _control_rx) = LoopbackTransport::new();
        let reconciler = Arc::new(TtlReconciler::new(adapter.clone(), 7));
        let backup = Arc::new(BackupManager::new(
            adapter.clone(),
            transport.clone(),
            &backup_config,
            "data_node",
            "core",
        ));
        let router =
            ResponseRouter::new(&ControlPlaneConfig::default(), transport).unwrap();
        let dispatcher = Arc::new(CommandDispatcher::new(
            "data_node",
            adapter.clone(),
            reconciler,
            backup,
            router,
        ));

        Fixture {
            dispatcher,
            adapter,
            peer_rx,
            _dir: dir,
        }
    }

    fn origin() -> SocketAddr {
        "192.168.7.3:40000".parse().unwrap()
    }

    fn command(source: &str, payload: Value) -> NodeMessage {
        NodeMessage::new(MessageType::Command, source, "data_node", payload)
    }

    async fn round_trip(f: &mut Fixture, payload: Value) -> NodeMessage {
        let inbound = command("sensor_node", payload);
        f.dispatcher.dispatch(inbound, origin()).await;
        f.peer_rx.recv().await.expect("a response must be sent").0
    }

    #[tokio::test]
    async fn test_create_collection_is_idempotent_and_ensures_ttl() {
        let mut f = fixture(true).await;

        let first = round_trip(
            &mut f,
            json!({"command": "create_collection", "collection": "readings"}),
        )
        .await;
        assert_eq!(first.payload["status"], "success");

        let second = round_trip(
            &mut f,
            json!({"command": "create_collection", "collection": "readings"}),
        )
        .await;
        assert_eq!(second.payload["status"], "success");

        let index = f.adapter.ttl_index("readings").await.unwrap().unwrap();
        assert_eq!(index.expire_after_secs, 7 * 86_400);
    }

    #[tokio::test]
    async fn test_unknown_command_fails_closed_with_echo() {
        let mut f = fixture(true).await;

        let response = round_trip(
            &mut f,
            json!({"command": "vacuum_everything", "request_id": "req-11"}),
        )
        .await;
        assert_eq!(response.payload["status"], "error");
        assert_eq!(response.payload["error_type"], "validation_error");
        assert_eq!(response.payload["request_id"], "req-11");
    }

    #[tokio::test]
    async fn test_malformed_payload_still_echoes_request_id() {
        let mut f = fixture(true).await;

        let response = round_trip(
            &mut f,
            json!({"command": "query_data", "collection": "r", "limit": "ten", "request_id": "req-12"}),
        )
        .await;
        assert_eq!(response.payload["error_type"], "validation_error");
        assert_eq!(response.payload["request_id"], "req-12");
    }

    #[tokio::test]
    async fn test_query_missing_collection_is_validation_error() {
        let mut f = fixture(true).await;

        let response = round_trip(
            &mut f,
            json!({"command": "query_data", "request_id": "req-q"}),
        )
        .await;
        assert_eq!(response.payload["status"], "error");
        assert_eq!(response.payload["error_type"], "validation_error");
        assert_eq!(response.payload["request_id"], "req-q");
        assert!(response.payload["message"]
            .as_str()
            .unwrap()
            .contains("collection"));
    }

    #[tokio::test]
    async fn test_disconnected_store_yields_connection_error() {
        let mut f = fixture(false).await;

        let response = round_trip(&mut f, json!({"command": "get_stats"})).await;
        assert_eq!(response.payload["status"], "error");
        assert_eq!(response.payload["error_type"], "connection_error");
    }

    #[tokio::test]
    async fn test_get_stats_on_empty_database() {
        let mut f = fixture(true).await;

        let response = round_trip(&mut f, json!({"command": "get_stats"})).await;
        assert_eq!(response.payload["status"], "success");
        assert_eq!(response.payload["collection_count"], 0);
        assert_eq!(response.payload["total_document_count"], 0);
        assert_eq!(response.payload["collections"], json!([]));
    }

    #[tokio::test]
    async fn test_get_stats_reports_counts_and_ttl() {
        let mut f = fixture(true).await;

        for value in 0..3 {
            round_trip(
                &mut f,
                json!({"command": "insert_one", "collection": "readings", "data": {"value": value}}),
            )
            .await;
        }

        let response = round_trip(&mut f, json!({"command": "get_stats"})).await;
        assert_eq!(response.payload["collection_count"], 1);
        assert_eq!(response.payload["total_document_count"], 3);
        let entry = &response.payload["collections"][0];
        assert_eq!(entry["name"], "readings");
        assert_eq!(entry["document_count"], 3);
        assert_eq!(entry["ttl_index"]["field"], "created_at");
        assert_eq!(entry["ttl_index"]["expire_after_seconds"], 7 * 86_400);
    }

    #[tokio::test]
    async fn test_insert_one_returns_string_id() {
        let mut f = fixture(true).await;

        let response = round_trip(
            &mut f,
            json!({"command": "insert_one", "collection": "readings", "data": {"value": 9}, "request_id": "req-i"}),
        )
        .await;
        assert_eq!(response.payload["status"], "success");
        assert_eq!(response.payload["request_id"], "req-i");
        let id = response.payload["inserted_id"].as_str().unwrap();
        assert_eq!(id.len(), 24);

        assert_eq!(f.adapter.count_documents("readings").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_one_requires_data() {
        let mut f = fixture(true).await;

        let response = round_trip(
            &mut f,
            json!({"command": "insert_one", "collection": "readings"}),
        )
        .await;
        assert_eq!(response.payload["error_type"], "validation_error");
        assert!(response.payload["message"].as_str().unwrap().contains("data"));
    }

    #[tokio::test]
    async fn test_concurrent_inserts_converge_on_one_index() {
        let f = fixture(true).await;

        let inserts = (0..8).map(|value| {
            let dispatcher = f.dispatcher.clone();
            async move {
                let inbound = command(
                    "sensor_node",
                    json!({"command": "insert_one", "collection": "burst", "data": {"value": value}}),
                );
                dispatcher.execute(&inbound).await
            }
        });
        let results = join_all(inserts).await;
        assert!(results.iter().all(|r| r.is_ok()));

        assert_eq!(f.adapter.count_documents("burst").await.unwrap(), 8);
        let index = f.adapter.ttl_index("burst").await.unwrap();
        assert!(index.is_some(), "exactly one TTL index must exist");
        assert_eq!(index.unwrap().expire_after_secs, 7 * 86_400);
    }

    #[tokio::test]
    async fn test_drop_collection_succeeds_when_absent() {
        let mut f = fixture(true).await;

        let response = round_trip(
            &mut f,
            json!({"command": "drop_collection", "collection": "never_existed"}),
        )
        .await;
        assert_eq!(response.payload["status"], "success");
    }

    #[tokio::test]
    async fn test_backup_and_restore_commands() {
        let mut f = fixture(true).await;

        round_trip(
            &mut f,
            json!({"command": "insert_one", "collection": "readings", "data": {"value": 1}}),
        )
        .await;

        let backup = round_trip(&mut f, json!({"command": "backup_database"})).await;
        assert_eq!(backup.payload["status"], "success");
        let name = backup.payload["backup_name"].as_str().unwrap().to_string();

        let restore = round_trip(
            &mut f,
            json!({"command": "restore_database", "backup_name": name}),
        )
        .await;
        assert_eq!(restore.payload["status"], "success");
        assert_eq!(restore.payload["collections_restored"], 1);
        assert_eq!(f.adapter.count_documents("readings").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_restore_requires_backup_name() {
        let mut f = fixture(true).await;

        let response = round_trip(&mut f, json!({"command": "restore_database"})).await;
        assert_eq!(response.payload["error_type"], "validation_error");
    }

    #[tokio::test]
    async fn test_response_addressing_per_source() {
        let mut f = fixture(true).await;

        // ordinary peer: answered at the arrival address
        let inbound = command("sensor_node", json!({"command": "get_stats"}));
        f.dispatcher.dispatch(inbound, origin()).await;
        let (response, addr) = f.peer_rx.recv().await.unwrap();
        assert_eq!(response.message_type, MessageType::Response);
        assert_eq!(response.source, "data_node");
        assert_eq!(response.destination, "sensor_node");
        assert_eq!(addr, origin());

        // control plane: answered at its well-known service endpoint
        let inbound = command("core", json!({"command": "get_stats"}));
        f.dispatcher.dispatch(inbound, origin()).await;
        let (response, addr) = f.peer_rx.recv().await.unwrap();
        assert_eq!(response.destination, "core");
        assert_eq!(addr, "127.0.0.1:14550".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_query_message_type_without_command_field() {
        let mut f = fixture(true).await;

        round_trip(
            &mut f,
            json!({"command": "insert_one", "collection": "readings", "data": {"value": 5}}),
        )
        .await;

        let inbound = NodeMessage::new(
            MessageType::Query,
            "core",
            "data_node",
            json!({"collection": "readings", "request_id": "req-q2"}),
        );
        f.dispatcher.dispatch(inbound, origin()).await;
        let (response, _) = f.peer_rx.recv().await.unwrap();
        assert_eq!(response.payload["status"], "success");
        assert_eq!(response.payload["count"], 1);
        assert_eq!(response.payload["request_id"], "req-q2");
    }
}
