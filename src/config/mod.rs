//! Configuration for the dstore node

mod backup;
mod logging;
mod node;
mod store;

pub use backup::BackupConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use node::{ControlPlaneConfig, NodeConfig};
pub use store::StoreConfig;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the dstore node
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Node identity and addressing
    #[serde(default)]
    pub node: NodeConfig,
    /// Backing-store connection and retention
    #[serde(default)]
    pub store: StoreConfig,
    /// Backup scheduling
    #[serde(default)]
    pub backup: BackupConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together so the user
    /// can fix everything in one pass rather than playing whack-a-mole.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Node validation
        if self.node.name.is_empty() {
            errors.push("node name must not be empty".to_string());
        }
        if self.node.listen_addr.is_empty() {
            errors.push("listen_addr must not be empty".to_string());
        }
        if self.node.control_plane.name.is_empty() {
            errors.push("control-plane name must not be empty".to_string());
        }
        if self.node.control_plane.service_port == 0 {
            errors.push("control-plane service_port must be nonzero".to_string());
        }
        if self.node.control_plane.service_port == self.node.control_plane.discovery_port {
            errors.push(format!(
                "control-plane service_port and discovery_port must differ, both are {}",
                self.node.control_plane.service_port
            ));
        }

        // Store validation
        if self.store.database.is_empty() {
            errors.push("store database must not be empty".to_string());
        }
        if self.store.port == 0 {
            errors.push("store port must be nonzero".to_string());
        }
        if self.store.retention_days == 0 {
            errors.push("retention_days must be positive".to_string());
        }
        if self.store.connect_timeout_secs == 0 {
            errors.push("connect_timeout_secs must be positive".to_string());
        }

        // Backup validation
        if self.backup.interval_secs == 0 {
            errors.push("backup interval_secs must be positive".to_string());
        }
        if self.backup.dir.as_os_str().is_empty() {
            errors.push("backup dir must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
