//! Transport seam and implementations.
//!
//! The service layer never owns sockets directly; it sends through the
//! [`Transport`] trait so the node can run over UDP in production and over
//! in-process channels in tests. Receiving is the [`UdpServer`]'s job: one
//! spawned handler task per inbound datagram, no serialization between them.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::service::protocol::{decode_message, encode_message};
use crate::service::CommandDispatcher;
use crate::types::NodeMessage;

/// Outbound message delivery
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message to a specific peer address.
    async fn send(&self, message: &NodeMessage, addr: SocketAddr) -> Result<()>;

    /// Send a message to the control plane's well-known service endpoint.
    async fn send_to_control_plane(&self, message: &NodeMessage) -> Result<()>;
}

/// UDP transport sharing the node's bound socket
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    control_plane_addr: SocketAddr,
}

impl UdpTransport {
    pub fn new(socket: Arc<UdpSocket>, control_plane_addr: SocketAddr) -> Self {
        Self {
            socket,
            control_plane_addr,
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, message: &NodeMessage, addr: SocketAddr) -> Result<()> {
        let bytes = encode_message(message)?;
        self.socket.send_to(&bytes, addr).await?;
        Ok(())
    }

    async fn send_to_control_plane(&self, message: &NodeMessage) -> Result<()> {
        self.send(message, self.control_plane_addr).await
    }
}

/// In-process transport that hands sent messages to channel receivers.
///
/// Used by tests and embedded setups to observe exactly what the node would
/// put on the wire, without sockets.
pub struct LoopbackTransport {
    peer_tx: mpsc::UnboundedSender<(NodeMessage, SocketAddr)>,
    control_tx: mpsc::UnboundedSender<NodeMessage>,
}

impl LoopbackTransport {
    #[allow(clippy::type_complexity)]
    pub fn new() -> (
        Arc<Self>,
        mpsc::UnboundedReceiver<(NodeMessage, SocketAddr)>,
        mpsc::UnboundedReceiver<NodeMessage>,
    ) {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                peer_tx,
                control_tx,
            }),
            peer_rx,
            control_rx,
        )
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, message: &NodeMessage, addr: SocketAddr) -> Result<()> {
        self.peer_tx
            .send((message.clone(), addr))
            .map_err(|_| anyhow::anyhow!("loopback peer receiver dropped"))
    }

    async fn send_to_control_plane(&self, message: &NodeMessage) -> Result<()> {
        self.control_tx
            .send(message.clone())
            .map_err(|_| anyhow::anyhow!("loopback control receiver dropped"))
    }
}

/// Receive loop over the node's UDP socket.
///
/// Each datagram is decoded and dispatched on its own task, so a slow
/// operation never blocks the socket.
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    dispatcher: Arc<CommandDispatcher>,
}

impl UdpServer {
    pub fn new(socket: Arc<UdpSocket>, dispatcher: Arc<CommandDispatcher>) -> Self {
        Self { socket, dispatcher }
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let local = self.socket.local_addr()?;
        info!("Listening for commands on {}", local);

        let mut buf = vec![0u8; crate::service::protocol::MAX_MESSAGE_SIZE];
        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    let (len, origin) = match received {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("Receive error: {}", e);
                            continue;
                        }
                    };

                    let message = match decode_message(&buf[..len]) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!("Dropping undecodable datagram from {}: {}", origin, e);
                            continue;
                        }
                    };

                    debug!("Inbound {:?} message from {}", message.message_type, origin);
                    let dispatcher = self.dispatcher.clone();
                    tokio::spawn(async move {
                        dispatcher.dispatch(message, origin).await;
                    });
                }
                _ = shutdown.recv() => {
                    info!("Command listener shutting down");
                    break;
                }
            }
        }
        Ok(())
    }
}
