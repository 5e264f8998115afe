// error.rs - Controller error types

use std::path::PathBuf;

use conway::GridError;
use conway_rpc::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoardIoError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: not a binary PGM image: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("{path}: image is {actual} but {expected} was requested")]
    WrongSize { path: PathBuf, expected: String, actual: String },

    #[error("invalid board: {0}")]
    Grid(#[from] GridError),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("RunGame failed: {0}")]
    RunFailed(#[source] ClientError),

    #[error("board I/O failed: {0}")]
    Board(#[from] BoardIoError),

    #[error("server sent an invalid board: {0}")]
    BadBoard(#[from] GridError),

    #[error("controller task failed: {0}")]
    Task(String),
}
