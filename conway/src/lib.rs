// lib.rs - Crate root: grid, stepper and simulation engine

//! Conway's Game of Life on a toroidal grid, stepped by concurrent row-band
//! workers.
//!
//! [`Simulation`] owns the authoritative board and runs the turn loop; each
//! turn fans out through [`stepper::step`] and joins before the new board is
//! published. Control-plane callers read consistent snapshots and steer the
//! loop through [`RunState`] while it runs.

pub mod engine;
pub mod error;
pub mod event;
pub mod grid;
pub mod patterns;
pub mod stepper;

pub use engine::{AliveCount, BoardSnapshot, RunOutcome, Simulation, TurnRequest, TurnResult};
pub use error::EngineError;
pub use event::{Event, RunState};
pub use grid::{ALIVE, Cell, DEAD, Grid, GridError};
