//! Node lifecycle: composition root, startup, shutdown.
//!
//! The node is a struct holding injected seams (engine, transport) rather
//! than an extension of a runtime base class. Startup is fatal on store
//! connectivity failure; shutdown joins the background backup task with a
//! bounded timeout before the store connection is closed, so no task ever
//! operates on a closed connection.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::service::backup::BackupManager;
use crate::service::dispatcher::CommandDispatcher;
use crate::service::router::ResponseRouter;
use crate::store::{DataEngine, StoreAdapter, TtlReconciler};
use crate::transport::Transport;

/// How long shutdown waits for the background task before aborting it
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The running data-access node
pub struct DataNode {
    config: Config,
    adapter: Arc<StoreAdapter>,
    dispatcher: Arc<CommandDispatcher>,
    shutdown_tx: broadcast::Sender<()>,
    backup_task: Mutex<Option<JoinHandle<()>>>,
}

impl DataNode {
    /// Start the node: connect the store (fatal on failure), wire the
    /// components, and launch the backup timer when enabled.
    pub async fn start(
        config: Config,
        engine: Arc<dyn DataEngine>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        info!("Starting node '{}'", config.node.name);

        let adapter = Arc::new(StoreAdapter::new(engine, &config.store));
        adapter.connect().await?;

        let reconciler = Arc::new(TtlReconciler::new(
            adapter.clone(),
            config.store.retention_days,
        ));
        let backup = Arc::new(BackupManager::new(
            adapter.clone(),
            transport.clone(),
            &config.backup,
            config.node.name.clone(),
            config.node.control_plane.name.clone(),
        ));
        let router = ResponseRouter::new(&config.node.control_plane, transport)?;
        let dispatcher = Arc::new(CommandDispatcher::new(
            config.node.name.clone(),
            adapter.clone(),
            reconciler,
            backup.clone(),
            router,
        ));

        let (shutdown_tx, _) = broadcast::channel(16);
        let backup_task = if config.backup.enabled {
            Some(backup.spawn_timer(
                Duration::from_secs(config.backup.interval_secs),
                shutdown_tx.subscribe(),
            ))
        } else {
            None
        };

        info!("Node '{}' running", config.node.name);
        Ok(Self {
            config,
            adapter,
            dispatcher,
            shutdown_tx,
            backup_task: Mutex::new(backup_task),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> Arc<CommandDispatcher> {
        self.dispatcher.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.adapter.is_connected()
    }

    /// Receiver that fires when the node begins stopping.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Stop the node: signal shutdown, join the backup task (bounded), then
    /// close the store connection. An in-flight backup cycle finishes; a
    /// merely pending one is preempted.
    pub async fn stop(&self) {
        info!("Stopping node '{}'", self.config.node.name);
        let _ = self.shutdown_tx.send(());

        let task = self.backup_task.lock().take();
        if let Some(handle) = task {
            let abort = handle.abort_handle();
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                warn!(
                    "Backup task did not stop within {:?}, aborting",
                    SHUTDOWN_TIMEOUT
                );
                abort.abort();
            }
        }

        self.adapter.disconnect().await;
        info!("Node '{}' stopped", self.config.node.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEngine;
    use crate::transport::LoopbackTransport;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir, backup_enabled: bool, interval_secs: u64) -> Config {
        let mut config = Config::default();
        config.backup.enabled = backup_enabled;
        config.backup.interval_secs = interval_secs;
        config.backup.dir = dir.path().to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let dir = TempDir::new().unwrap();
        let (transport, _peer_rx, _control_rx) = LoopbackTransport::new();
        let node = DataNode::start(
            test_config(&dir, false, 3600),
            Arc::new(MemoryEngine::new()),
            transport,
        )
        .await
        .unwrap();

        assert!(node.is_connected());
        node.stop().await;
        assert!(!node.is_connected());
    }

    #[tokio::test]
    async fn test_startup_is_fatal_when_store_unreachable() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(MemoryEngine::new());
        engine.shutdown().await.unwrap();

        let (transport, _peer_rx, _control_rx) = LoopbackTransport::new();
        let result = DataNode::start(test_config(&dir, false, 3600), engine, transport).await;
        assert!(result.is_err(), "node must not run while disconnected");
    }

    #[tokio::test]
    async fn test_stop_preempts_pending_backup_cycle() {
        let dir = TempDir::new().unwrap();
        let (transport, _peer_rx, _control_rx) = LoopbackTransport::new();
        // long interval: the first cycle is still pending when stop lands
        let node = DataNode::start(
            test_config(&dir, true, 3600),
            Arc::new(MemoryEngine::new()),
            transport,
        )
        .await
        .unwrap();

        node.stop().await;

        let artifacts: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(artifacts.is_empty(), "preempted cycle must write nothing");
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_cycle_completes_before_disconnect() {
        let dir = TempDir::new().unwrap();
        let (transport, _peer_rx, mut control_rx) = LoopbackTransport::new();
        let engine = Arc::new(MemoryEngine::new());
        engine
            .insert_many(
                "readings",
                vec![[("value".to_string(), serde_json::json!(1))]
                    .into_iter()
                    .collect()],
            )
            .await
            .unwrap();

        let node = DataNode::start(test_config(&dir, true, 1), engine, transport)
            .await
            .unwrap();

        // paused clock: advancing time fires the first cycle deterministically
        tokio::time::advance(Duration::from_millis(1100)).await;
        let status = control_rx.recv().await.expect("cycle must complete");
        assert!(status.payload["backup_completed"].is_string());

        node.stop().await;
        assert!(!node.is_connected());
        let artifacts: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(!artifacts.is_empty(), "completed cycle must leave artifacts");
    }
}
