// lib.rs - Crate root: control protocol, service, server and client

//! Remote control protocol for a running Game of Life simulation.
//!
//! - `RunGame` - start a simulation and block until it finishes
//! - `GetAliveCount` - turn and live-cell count of the last completed turn
//! - `GetBoard` - copy of the board as of the last completed turn
//! - `ChangeState` - pause, resume or quit
//! - `ShutDown` - stop at the next turn boundary and take the server down
//!
//! # Example
//!
//! ```ignore
//! let service = Arc::new(ControlService::new());
//! let server = RpcServer::bind(ServerConfig::default(), service).await?;
//! server.serve().await?;
//!
//! // elsewhere
//! let client = RpcClient::connect("127.0.0.1:8030").await?;
//! let count = client.alive_count().await?;
//! ```

mod client;
mod config;
mod error;
mod server;
mod service;
pub mod wire;

pub use client::RpcClient;
pub use config::{DEFAULT_PORT, ServerConfig};
pub use error::{ClientError, ServerError, ServiceError};
pub use server::RpcServer;
pub use service::ControlService;
pub use wire::{
    AliveCountResponse, BoardResponse, ChangeStateResponse, GameRequest, GameResponse, Request,
    Response,
};
