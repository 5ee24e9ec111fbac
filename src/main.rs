//! dstore: document-store access node

use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dstore::{
    config::Config,
    service::DataNode,
    store::MemoryEngine,
    transport::{UdpServer, UdpTransport},
};
use tokio::net::UdpSocket;
use tokio::signal;
use tracing::info;

#[derive(Parser)]
#[command(name = "dstore")]
#[command(about = "Document-store access node")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "dstore.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start {
        /// Listen address override
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Validate the configuration and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    config.logging.init(cli.verbose)?;

    match cli.command {
        Commands::Start { listen } => {
            if let Some(listen) = listen {
                config.node.listen_addr = listen;
            }
            run_node(config).await
        }
        Commands::CheckConfig => {
            config.validate()?;
            println!("Configuration OK");
            Ok(())
        }
    }
}

async fn run_node(config: Config) -> Result<()> {
    let socket = Arc::new(
        UdpSocket::bind(&config.node.listen_addr)
            .await
            .with_context(|| format!("cannot bind '{}'", config.node.listen_addr))?,
    );

    let control_plane_addr = config
        .node
        .control_plane
        .service_addr()
        .to_socket_addrs()
        .context("cannot resolve control-plane endpoint")?
        .next()
        .context("control-plane endpoint resolved to nothing")?;
    let transport = Arc::new(UdpTransport::new(socket.clone(), control_plane_addr));

    let engine = Arc::new(MemoryEngine::new());
    let node = DataNode::start(config, engine, transport).await?;

    let server = UdpServer::new(socket, node.dispatcher());
    let shutdown_rx = node.subscribe_shutdown();
    let server_handle = tokio::spawn(async move { server.run(shutdown_rx).await });

    signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    node.stop().await;
    server_handle.await??;
    Ok(())
}
