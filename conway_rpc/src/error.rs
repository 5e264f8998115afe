// error.rs - Error types for the control service, server and client

use conway::EngineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::wire::FrameError;

/// Failures a control call can report back to the caller. Sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ServiceError {
    #[error("no simulation is running")]
    NotStarted,

    #[error("simulation has already been stopped")]
    AlreadyStopped,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("a simulation is already running")]
    AlreadyRunning,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for ServiceError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::InvalidParameter(msg) => ServiceError::InvalidParameter(msg),
            EngineError::InvalidBoard(e) => ServiceError::InvalidParameter(e.to_string()),
            EngineError::AlreadyRunning => ServiceError::AlreadyRunning,
            EngineError::Stopped => ServiceError::AlreadyStopped,
            EngineError::WorkerFailed(msg) => ServiceError::Internal(msg),
        }
    }
}

/// Errors from the RPC server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Errors seen by an [`RpcClient`](crate::RpcClient) caller.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error: {0}")]
    Frame(#[from] FrameError),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("server error: {0}")]
    Remote(#[from] ServiceError),

    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}

impl ClientError {
    /// True for channel failures (as opposed to errors the server reported).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Connect { .. }
                | ClientError::Frame(_)
                | ClientError::Timeout(_)
                | ClientError::ConnectionClosed
        )
    }
}
