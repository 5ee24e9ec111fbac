//! Node identity and addressing configuration

use serde::{Deserialize, Serialize};

/// Identity and listen address of this node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name this node announces as its message source
    pub name: String,
    /// UDP listen address for inbound commands
    pub listen_addr: String,
    /// Control-plane node endpoints
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "data_node".to_string(),
            listen_addr: "0.0.0.0:14552".to_string(),
            control_plane: ControlPlaneConfig::default(),
        }
    }
}

/// Addressing for the control-plane node.
///
/// The control plane announces itself under `name`, but its announced
/// identity and its receiving socket are not the same as its outbound
/// discovery socket. Replies destined for it therefore go to
/// `host:service_port`, never back to the address a packet arrived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    /// Node name the control plane uses as a message source
    pub name: String,
    /// Control-plane host
    pub host: String,
    /// Well-known command/response endpoint
    pub service_port: u16,
    /// Discovery/broadcast endpoint (must differ from `service_port`)
    pub discovery_port: u16,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            name: "core".to_string(),
            host: "127.0.0.1".to_string(),
            service_port: 14550,
            discovery_port: 14551,
        }
    }
}

impl ControlPlaneConfig {
    /// The well-known service endpoint as `host:port`.
    pub fn service_addr(&self) -> String {
        format!("{}:{}", self.host, self.service_port)
    }
}
