//! Backing-store configuration

use serde::{Deserialize, Serialize};

/// Connection and retention settings for the document store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store host
    pub host: String,
    /// Store port
    pub port: u16,
    /// Database name
    pub database: String,
    /// Connect/ping timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Document retention in days; drives each collection's TTL index
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_retention_days() -> u64 {
    7
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 27017,
            database: "dstore".to_string(),
            connect_timeout_secs: default_connect_timeout(),
            retention_days: default_retention_days(),
        }
    }
}
