// event.rs - Run states and the notifications emitted while a game runs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::Cell;

/// Lifecycle of a running simulation.
///
/// `Executing <-> Paused` may repeat; either may move to `Quitting`, which is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    Executing,
    Paused,
    Quitting,
}

impl RunState {
    /// Nothing leaves `Quitting`. Repeating a non-terminal state is a no-op.
    pub fn is_terminal(self) -> bool {
        self == RunState::Quitting
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Executing => write!(f, "Executing"),
            RunState::Paused => write!(f, "Paused"),
            RunState::Quitting => write!(f, "Quitting"),
        }
    }
}

/// Notifications for display/telemetry consumers. Consumers must tolerate
/// these arriving out of step with control calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    CellFlipped { turn: u32, cell: Cell },
    AliveCellsCount { turn: u32, count: usize },
    StateChange { turn: u32, new_state: RunState },
    ImageOutputComplete { turn: u32, filename: String },
    FinalTurnComplete { turn: u32, alive: Vec<Cell> },
}

impl Event {
    pub fn turn(&self) -> u32 {
        match self {
            Event::CellFlipped { turn, .. }
            | Event::AliveCellsCount { turn, .. }
            | Event::StateChange { turn, .. }
            | Event::ImageOutputComplete { turn, .. }
            | Event::FinalTurnComplete { turn, .. } => *turn,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::CellFlipped { turn, cell } => {
                write!(f, "turn {turn}: cell ({}, {}) flipped", cell.x, cell.y)
            }
            Event::AliveCellsCount { turn, count } => {
                write!(f, "turn {turn}: {count} cells alive")
            }
            Event::StateChange { turn, new_state } => write!(f, "turn {turn}: {new_state}"),
            Event::ImageOutputComplete { turn, filename } => {
                write!(f, "turn {turn}: wrote {filename}")
            }
            Event::FinalTurnComplete { turn, alive } => {
                write!(f, "turn {turn}: final turn complete, {} cells alive", alive.len())
            }
        }
    }
}
