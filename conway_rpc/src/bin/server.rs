// server.rs - Compute server binary

//! Game of Life compute server.
//!
//! Listens for a controller, runs the simulations it submits and answers
//! control calls while they run. Exits once a run is shut down.
//!
//! ```bash
//! conway-server --port 8030
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use conway_rpc::{ControlService, DEFAULT_PORT, RpcServer, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "conway-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Interface to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    listen: IpAddr,

    /// Milliseconds to let in-flight replies flush after a shutdown
    #[arg(long, default_value = "200")]
    shutdown_grace_ms: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = ServerConfig {
        listen_addr: SocketAddr::new(args.listen, args.port),
        shutdown_grace: Duration::from_millis(args.shutdown_grace_ms),
    };
    let service = Arc::new(ControlService::new());
    let server = RpcServer::bind(config.clone(), service)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;

    server.serve().await.context("control service failed")?;
    info!("Server exiting");
    Ok(())
}
