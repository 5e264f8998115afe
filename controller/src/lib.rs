// lib.rs - Crate root: controller session and board I/O

//! Controller side of the distributed Game of Life.
//!
//! A [`Controller`] submits one board to the compute server and drives the
//! run: it polls the alive-cell count, turns keypresses into control calls
//! and writes boards through a [`BoardSink`]. Progress is reported as
//! [`conway::Event`]s.

pub mod board_io;
pub mod config;
pub mod controller;
pub mod error;

pub use board_io::{BoardSink, BoardSource, PgmStore};
pub use config::{ControllerConfig, Params};
pub use controller::{Command, Controller, Ending, RunSummary};
pub use error::{BoardIoError, ControllerError};
