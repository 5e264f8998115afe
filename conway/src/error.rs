// error.rs - Engine error types

use thiserror::Error;

use crate::grid::GridError;

/// Errors raised by the simulation engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid board: {0}")]
    InvalidBoard(#[from] GridError),

    #[error("simulation has already been run")]
    AlreadyRunning,

    #[error("simulation is stopping")]
    Stopped,

    #[error("worker failed: {0}")]
    WorkerFailed(String),
}
