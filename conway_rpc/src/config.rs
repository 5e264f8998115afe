// config.rs - Server configuration

use std::net::SocketAddr;
use std::time::Duration;

/// Port the control service listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 8030;

/// Configuration for the RPC server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
    /// How long to wait for in-flight replies to flush once the simulation
    /// has stopped. Connections still busy after this are dropped.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            shutdown_grace: Duration::from_millis(200),
        }
    }
}
