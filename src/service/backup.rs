//! Backup and restore of the document store.
//!
//! Snapshot capture walks every collection and writes one JSON artifact per
//! collection, named `{snapshot}_{collection}.json`. Each artifact is
//! written to a temp file and renamed, so it is complete or absent; there is
//! no all-or-nothing guarantee across collections.
//!
//! Restore is ADDITIVE: it never clears target collections first, so
//! restoring onto non-empty collections can duplicate documents. This
//! merge semantics is deliberate and covered by tests; clear the target
//! collections yourself if you want replacement semantics.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BackupConfig;
use crate::error::ServiceError;
use crate::service::query::sanitize_document;
use crate::store::{FindQuery, StoreAdapter};
use crate::transport::Transport;
use crate::types::{Document, NodeMessage};

/// Artifact file extension
const ARTIFACT_EXT: &str = "json";

/// What the manager is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupState {
    Idle,
    BackingUp,
    Restoring,
}

/// Outcome of one snapshot capture
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub name: String,
    pub collections: usize,
}

/// Outcome of one restore
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub name: String,
    pub collections_restored: usize,
    pub documents_restored: usize,
}

/// Captures snapshots and restores them; owns the autonomous timer logic
pub struct BackupManager {
    adapter: Arc<StoreAdapter>,
    transport: Arc<dyn Transport>,
    dir: PathBuf,
    node_name: String,
    control_plane_name: String,
    state: RwLock<BackupState>,
    /// Serializes capture/restore; guarantees a single in-flight snapshot
    /// system-wide, whether timer-driven or on-demand.
    op_lock: Mutex<()>,
}

impl BackupManager {
    pub fn new(
        adapter: Arc<StoreAdapter>,
        transport: Arc<dyn Transport>,
        config: &BackupConfig,
        node_name: impl Into<String>,
        control_plane_name: impl Into<String>,
    ) -> Self {
        Self {
            adapter,
            transport,
            dir: config.dir.clone(),
            node_name: node_name.into(),
            control_plane_name: control_plane_name.into(),
            state: RwLock::new(BackupState::Idle),
            op_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> BackupState {
        *self.state.read()
    }

    /// Capture a snapshot of every collection.
    ///
    /// On success the control plane is notified with the snapshot name,
    /// for on-demand and scheduled runs alike. On failure nothing is
    /// emitted; artifacts already written stay behind.
    pub async fn run_backup(&self) -> Result<BackupReport, ServiceError> {
        self.adapter.ensure_connected()?;
        let _guard = self.op_lock.lock().await;

        *self.state.write() = BackupState::BackingUp;
        let result = self.capture().await;
        *self.state.write() = BackupState::Idle;

        match &result {
            Ok(report) => {
                info!(
                    "Backup completed: {} ({} collection(s))",
                    report.name, report.collections
                );
                self.notify_completed(&report.name).await;
            }
            Err(e) => warn!("Backup failed: {}", e),
        }
        result
    }

    async fn capture(&self) -> Result<BackupReport, ServiceError> {
        let name = format!("backup_{}", Utc::now().format("%Y%m%d_%H%M%S"));

        std::fs::create_dir_all(&self.dir).map_err(|e| {
            ServiceError::database(format!(
                "cannot create backup directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        let collections = self.adapter.list_collections().await?;
        for collection in &collections {
            let documents = self.adapter.find(collection, &FindQuery::default()).await?;
            let exported: Vec<Document> =
                documents.into_iter().map(sanitize_document).collect();
            self.write_artifact(&name, collection, &exported)?;
            debug!(
                "Exported {} document(s) from '{}'",
                exported.len(),
                collection
            );
        }

        Ok(BackupReport {
            name,
            collections: collections.len(),
        })
    }

    /// Write one artifact atomically: temp file, then rename.
    fn write_artifact(
        &self,
        snapshot: &str,
        collection: &str,
        documents: &[Document],
    ) -> Result<(), ServiceError> {
        let path = self
            .dir
            .join(format!("{}_{}.{}", snapshot, collection, ARTIFACT_EXT));
        let bytes = serde_json::to_vec_pretty(documents)
            .map_err(|e| ServiceError::database(format!("cannot serialize '{}': {}", collection, e)))?;

        let write = || -> std::io::Result<()> {
            let temp_path = path.with_extension("tmp");
            let mut file = std::fs::File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            std::fs::rename(temp_path, &path)?;
            Ok(())
        };
        write().map_err(|e| {
            ServiceError::database(format!("cannot write artifact '{}': {}", path.display(), e))
        })
    }

    async fn notify_completed(&self, snapshot: &str) {
        let message = NodeMessage::status(
            self.node_name.clone(),
            self.control_plane_name.clone(),
            json!({ "backup_completed": snapshot }),
        );
        if let Err(e) = self.transport.send_to_control_plane(&message).await {
            warn!("Failed to notify control plane of backup: {}", e);
        }
    }

    /// Restore a named snapshot, bulk-inserting each artifact's documents
    /// into the correspondingly named collection. Additive; see the module
    /// docs.
    pub async fn run_restore(&self, name: &str) -> Result<RestoreReport, ServiceError> {
        self.adapter.ensure_connected()?;
        let _guard = self.op_lock.lock().await;

        *self.state.write() = BackupState::Restoring;
        let result = self.recover(name).await;
        *self.state.write() = BackupState::Idle;

        match &result {
            Ok(report) => info!(
                "Restore completed: {} ({} collection(s), {} document(s))",
                report.name, report.collections_restored, report.documents_restored
            ),
            Err(e) => warn!("Restore failed: {}", e),
        }
        result
    }

    async fn recover(&self, name: &str) -> Result<RestoreReport, ServiceError> {
        let prefix = format!("{}_", name);
        let suffix = format!(".{}", ARTIFACT_EXT);

        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            ServiceError::validation(format!(
                "cannot read backup directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut collections_restored = 0usize;
        let mut documents_restored = 0usize;
        for entry in entries {
            let entry = entry.map_err(|e| ServiceError::database(e.to_string()))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.starts_with(&prefix) || !file_name.ends_with(&suffix) {
                continue;
            }
            let collection = &file_name[prefix.len()..file_name.len() - suffix.len()];
            if collection.is_empty() {
                continue;
            }

            let bytes = std::fs::read(entry.path())
                .map_err(|e| ServiceError::database(format!("cannot read '{}': {}", file_name, e)))?;
            let documents: Vec<Document> = serde_json::from_slice(&bytes).map_err(|e| {
                ServiceError::database(format!("artifact '{}' is not a document array: {}", file_name, e))
            })?;

            documents_restored += self.adapter.insert_many(collection, documents).await?;
            collections_restored += 1;
            debug!("Restored collection '{}' from '{}'", collection, file_name);
        }

        if collections_restored == 0 {
            return Err(ServiceError::validation(format!(
                "no backup artifacts found for '{}'",
                name
            )));
        }

        Ok(RestoreReport {
            name: name.to_string(),
            collections_restored,
            documents_restored,
        })
    }

    /// Run the autonomous backup timer until shutdown.
    ///
    /// The handle is owned by the node and joined on stop. A shutdown that
    /// lands while the timer sleeps preempts the pending cycle: the channel
    /// is re-checked after waking, before any work happens.
    pub fn spawn_timer(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            info!("Backup timer started ({:?} interval)", interval);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        match shutdown.try_recv() {
                            Ok(_) | Err(TryRecvError::Closed) => break,
                            Err(_) => {}
                        }
                        if !manager.adapter.is_connected() {
                            debug!("Skipping backup cycle: store not connected");
                            continue;
                        }
                        if let Err(e) = manager.run_backup().await {
                            warn!("Scheduled backup failed: {}", e);
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
            info!("Backup timer stopped");
        })
    }
}
