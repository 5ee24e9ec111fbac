//! Response routing.
//!
//! Picks the destination address for an outbound response. The control-plane
//! node's announced identity and its receiving endpoint are not the socket
//! its packets arrive from, so replies to it go to the configured service
//! endpoint; everyone else is answered at the address they sent from.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::config::ControlPlaneConfig;
use crate::service::protocol::encode_message;
use crate::transport::Transport;
use crate::types::NodeMessage;

/// Routes and sends response messages
pub struct ResponseRouter {
    control_plane_name: String,
    control_plane_addr: SocketAddr,
    transport: Arc<dyn Transport>,
}

impl ResponseRouter {
    pub fn new(config: &ControlPlaneConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let control_plane_addr = config
            .service_addr()
            .to_socket_addrs()
            .with_context(|| format!("cannot resolve control-plane endpoint '{}'", config.service_addr()))?
            .next()
            .with_context(|| format!("control-plane endpoint '{}' resolved to nothing", config.service_addr()))?;
        Ok(Self {
            control_plane_name: config.name.clone(),
            control_plane_addr,
            transport,
        })
    }

    /// Destination address for a reply to `reply_to`, given the socket
    /// address the triggering message physically arrived from.
    pub fn resolve(&self, reply_to: &str, origin: SocketAddr) -> SocketAddr {
        if reply_to == self.control_plane_name {
            self.control_plane_addr
        } else {
            origin
        }
    }

    /// Serialize and send a response. Delivery failures are logged, never
    /// propagated; the operation itself already completed or failed on its
    /// own terms.
    pub async fn deliver(&self, response: &NodeMessage, origin: SocketAddr) {
        let addr = self.resolve(&response.destination, origin);

        // encode first so an oversized response is caught before any send
        if let Err(e) = encode_message(response) {
            warn!("Response to '{}' is not sendable: {}", response.destination, e);
            return;
        }

        debug!("Routing response for '{}' to {}", response.destination, addr);
        if let Err(e) = self.transport.send(response, addr).await {
            warn!("Failed to send response to {}: {}", addr, e);
        }
    }
}
