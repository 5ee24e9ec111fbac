//! Adapter over the document-store engine.
//!
//! Owns the connection lifecycle and is the single place engine errors are
//! translated into the service taxonomy. The handle is created once at
//! startup and shared across all concurrent handlers; only the stop path
//! disconnects it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::json;
use tracing::{error, info};

use crate::config::StoreConfig;
use crate::error::ServiceError;
use crate::types::Document;

use super::engine::{DataEngine, FindQuery, TtlIndex};

/// Connection lifecycle state, owned exclusively by the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Shared handle to the backing store
pub struct StoreAdapter {
    engine: Arc<dyn DataEngine>,
    database: String,
    connect_timeout: Duration,
    state: RwLock<ConnectionState>,
}

impl StoreAdapter {
    pub fn new(engine: Arc<dyn DataEngine>, config: &StoreConfig) -> Self {
        Self {
            engine,
            database: config.database.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            state: RwLock::new(ConnectionState::Disconnected),
        }
    }

    /// Establish the connection by probing the engine.
    ///
    /// Startup treats a failure here as fatal: the service must not claim to
    /// be running while disconnected.
    pub async fn connect(&self) -> Result<(), ServiceError> {
        *self.state.write() = ConnectionState::Connecting;

        let probe = tokio::time::timeout(self.connect_timeout, self.engine.ping()).await;
        match probe {
            Ok(Ok(())) => {
                *self.state.write() = ConnectionState::Connected;
                info!("Connected to document database: {}", self.database);
                Ok(())
            }
            Ok(Err(e)) => {
                *self.state.write() = ConnectionState::Error;
                error!("Failed to connect to database: {}", e);
                Err(ServiceError::connection(format!(
                    "failed to connect to database '{}': {}",
                    self.database, e
                )))
            }
            Err(_) => {
                *self.state.write() = ConnectionState::Error;
                error!(
                    "Database connect timed out after {:?}",
                    self.connect_timeout
                );
                Err(ServiceError::connection(format!(
                    "connect to database '{}' timed out",
                    self.database
                )))
            }
        }
    }

    /// Close the connection. Only the stop path calls this.
    pub async fn disconnect(&self) {
        if let Err(e) = self.engine.shutdown().await {
            error!("Error shutting down engine: {}", e);
        }
        *self.state.write() = ConnectionState::Disconnected;
        info!("Disconnected from database");
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Fail fast when the store is not connected.
    pub fn ensure_connected(&self) -> Result<(), ServiceError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ServiceError::connection("database is not connected"))
        }
    }

    fn store_err(e: anyhow::Error) -> ServiceError {
        ServiceError::database(e.to_string())
    }

    pub async fn list_collections(&self) -> Result<Vec<String>, ServiceError> {
        self.ensure_connected()?;
        self.engine.list_collections().await.map_err(Self::store_err)
    }

    pub async fn create_collection(&self, name: &str) -> Result<(), ServiceError> {
        self.ensure_connected()?;
        self.engine.create_collection(name).await.map_err(Self::store_err)
    }

    pub async fn drop_collection(&self, name: &str) -> Result<(), ServiceError> {
        self.ensure_connected()?;
        self.engine.drop_collection(name).await.map_err(Self::store_err)
    }

    /// Insert one document, stamping `created_at` so the collection's TTL
    /// index has a field to expire on. The stamp is store-native (`$date`).
    pub async fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<String, ServiceError> {
        self.ensure_connected()?;
        document.insert(
            "created_at".to_string(),
            json!({ "$date": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true) }),
        );
        self.engine
            .insert_one(collection, document)
            .await
            .map_err(Self::store_err)
    }

    /// Bulk-insert documents exactly as given (restore path).
    pub async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<usize, ServiceError> {
        self.ensure_connected()?;
        self.engine
            .insert_many(collection, documents)
            .await
            .map_err(Self::store_err)
    }

    pub async fn find(
        &self,
        collection: &str,
        query: &FindQuery,
    ) -> Result<Vec<Document>, ServiceError> {
        self.ensure_connected()?;
        self.engine.find(collection, query).await.map_err(Self::store_err)
    }

    pub async fn count_documents(&self, collection: &str) -> Result<u64, ServiceError> {
        self.ensure_connected()?;
        self.engine
            .count_documents(collection)
            .await
            .map_err(Self::store_err)
    }

    pub async fn ttl_index(&self, collection: &str) -> Result<Option<TtlIndex>, ServiceError> {
        self.ensure_connected()?;
        self.engine.ttl_index(collection).await.map_err(Self::store_err)
    }

    pub async fn create_ttl_index(
        &self,
        collection: &str,
        index: TtlIndex,
    ) -> Result<(), ServiceError> {
        self.ensure_connected()?;
        self.engine
            .create_ttl_index(collection, index)
            .await
            .map_err(Self::store_err)
    }

    pub async fn update_ttl_index(
        &self,
        collection: &str,
        name: &str,
        expire_after_secs: u64,
    ) -> Result<(), ServiceError> {
        self.ensure_connected()?;
        self.engine
            .update_ttl_index(collection, name, expire_after_secs)
            .await
            .map_err(Self::store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEngine;

    fn adapter() -> StoreAdapter {
        StoreAdapter::new(Arc::new(MemoryEngine::new()), &StoreConfig::default())
    }

    #[tokio::test]
    async fn test_connect_transitions_state() {
        let adapter = adapter();
        assert_eq!(adapter.state(), ConnectionState::Disconnected);
        adapter.connect().await.unwrap();
        assert_eq!(adapter.state(), ConnectionState::Connected);
        adapter.disconnect().await;
        assert_eq!(adapter.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_operations_fail_fast_when_disconnected() {
        let adapter = adapter();
        let err = adapter.list_collections().await.unwrap_err();
        assert_eq!(err.kind(), "connection_error");

        let err = adapter
            .insert_one("readings", Document::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "connection_error");
    }

    #[tokio::test]
    async fn test_connect_failure_is_connection_error() {
        let engine = Arc::new(MemoryEngine::new());
        engine.shutdown().await.unwrap();
        let adapter = StoreAdapter::new(engine, &StoreConfig::default());
        let err = adapter.connect().await.unwrap_err();
        assert_eq!(err.kind(), "connection_error");
        assert_eq!(adapter.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn test_insert_stamps_created_at() {
        let adapter = adapter();
        adapter.connect().await.unwrap();

        let mut doc = Document::new();
        doc.insert("value".to_string(), serde_json::json!(7));
        let id = adapter.insert_one("readings", doc).await.unwrap();
        assert!(!id.is_empty());

        let all = adapter.find("readings", &FindQuery::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        let stamp = all[0]["created_at"]["$date"]
            .as_str()
            .expect("created_at should be a $date");
        assert!(stamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_engine_failure_maps_to_database_error() {
        let adapter = StoreAdapter::new(Arc::new(MemoryEngine::new()), &StoreConfig::default());
        adapter.connect().await.unwrap();

        // updating an index that does not exist is an engine-level failure
        let err = adapter
            .update_ttl_index("readings", "missing", 60)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "database_error");
    }
}
