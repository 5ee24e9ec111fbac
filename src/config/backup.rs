//! Backup scheduling configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings for the autonomous backup timer and snapshot storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Whether the background backup timer runs at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seconds between autonomous backup cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Directory snapshot artifacts are written to
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    3600
}

fn default_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "dstore")
        .map(|d| d.data_dir().join("backups"))
        .unwrap_or_else(|| PathBuf::from("backups"))
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval(),
            dir: default_dir(),
        }
    }
}
