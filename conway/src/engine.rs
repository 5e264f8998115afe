// engine.rs - Simulation engine: owns the authoritative board and runs the turn loop

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::event::RunState;
use crate::grid::{Cell, Grid};
use crate::stepper::step;

/// Everything needed to start a run. Immutable once the run starts.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub width: usize,
    pub height: usize,
    pub threads: usize,
    pub turns: u32,
    pub board: Grid,
}

impl TurnRequest {
    /// Reject unusable parameters before any worker is spawned.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.width == 0 || self.height == 0 {
            return Err(EngineError::InvalidParameter(format!(
                "image dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.threads == 0 {
            return Err(EngineError::InvalidParameter("thread count must be at least 1".into()));
        }
        if self.threads > self.height {
            return Err(EngineError::InvalidParameter(format!(
                "thread count {} exceeds image height {}",
                self.threads, self.height
            )));
        }
        if self.board.width() != self.width || self.board.height() != self.height {
            return Err(EngineError::InvalidParameter(format!(
                "board is {}x{} but the request says {}x{}",
                self.board.width(),
                self.board.height(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }
}

/// Final state of a run that went the distance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnResult {
    pub board: Grid,
    pub completed_turns: u32,
    /// Row-major: y ascending, then x ascending.
    pub alive: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(TurnResult),
    /// Quit at a turn boundary; `turn` is the last completed turn.
    Stopped { turn: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliveCount {
    pub turn: u32,
    pub alive: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub turn: u32,
    pub board: Grid,
}

/// State as of the most recently completed turn. Swapped whole, never mutated.
#[derive(Debug)]
struct Published {
    turn: u32,
    alive_count: usize,
    board: Arc<Grid>,
}

/// One simulation run.
///
/// The turn loop ([`Simulation::run`]) is the only writer. Control calls read
/// the published snapshot without blocking it and steer the loop through the
/// run state.
#[derive(Debug)]
pub struct Simulation {
    width: usize,
    height: usize,
    threads: usize,
    turns: u32,
    published: ArcSwap<Published>,
    run_state: watch::Sender<RunState>,
    started: AtomicBool,
}

impl Simulation {
    pub fn new(request: TurnRequest) -> Result<Self, EngineError> {
        request.validate()?;

        let TurnRequest { width, height, threads, turns, board } = request;
        let published = Published { turn: 0, alive_count: board.alive_count(), board: Arc::new(board) };
        let (run_state, _) = watch::channel(RunState::Executing);

        Ok(Self {
            width,
            height,
            threads,
            turns,
            published: ArcSwap::from_pointee(published),
            run_state,
            started: AtomicBool::new(false),
        })
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn current_turn(&self) -> u32 {
        self.published.load().turn
    }

    pub fn run_state(&self) -> RunState {
        *self.run_state.borrow()
    }

    /// Run the turn loop to completion, or until a quit is observed at a
    /// turn boundary. May be called once per simulation.
    pub async fn run(&self) -> Result<RunOutcome, EngineError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }

        info!(
            width = self.width,
            height = self.height,
            threads = self.threads,
            turns = self.turns,
            "Starting simulation"
        );

        let mut state = self.run_state.subscribe();
        let mut board = Arc::clone(&self.published.load().board);

        for turn in 0..self.turns {
            if !wait_until_runnable(&mut state).await {
                info!(turn, "Simulation stopped");
                return Ok(RunOutcome::Stopped { turn });
            }

            let next = Arc::new(step(Arc::clone(&board), self.threads).await?);
            self.publish(turn + 1, Arc::clone(&next));
            board = next;
        }

        if self.run_state().is_terminal() {
            info!(turn = self.turns, "Simulation stopped after final turn");
            return Ok(RunOutcome::Stopped { turn: self.turns });
        }

        let board = Arc::unwrap_or_clone(board);
        let alive = board.alive_cells();
        info!(turns = self.turns, alive = alive.len(), "Simulation complete");
        Ok(RunOutcome::Completed(TurnResult { board, completed_turns: self.turns, alive }))
    }

    fn publish(&self, turn: u32, board: Arc<Grid>) {
        let alive_count = board.alive_count();
        self.published.store(Arc::new(Published { turn, alive_count, board }));
        debug!(turn, alive_count, "Turn complete");
    }

    pub fn snapshot_alive_count(&self) -> AliveCount {
        let published = self.published.load();
        AliveCount { turn: published.turn, alive: published.alive_count }
    }

    /// Deep copy of the published board. The copy happens outside any lock.
    pub fn snapshot_board(&self) -> BoardSnapshot {
        let published = self.published.load_full();
        BoardSnapshot { turn: published.turn, board: (*published.board).clone() }
    }

    /// Move to `next` and return the turn as of the call.
    ///
    /// Pausing takes effect before the next turn starts, never mid-step.
    pub fn change_state(&self, next: RunState) -> Result<u32, EngineError> {
        let mut rejected = false;
        let changed = self.run_state.send_if_modified(|current| {
            if current.is_terminal() {
                rejected = true;
                return false;
            }
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if rejected {
            return Err(EngineError::Stopped);
        }

        let turn = self.current_turn();
        if changed {
            info!(turn, state = %next, "Run state changed");
        }
        Ok(turn)
    }

    pub fn request_shutdown(&self) -> Result<u32, EngineError> {
        self.change_state(RunState::Quitting)
    }
}

/// Block while paused. Returns `false` once quitting.
async fn wait_until_runnable(state: &mut watch::Receiver<RunState>) -> bool {
    loop {
        let current = *state.borrow_and_update();
        match current {
            RunState::Executing => return true,
            RunState::Quitting => return false,
            RunState::Paused => {
                if state.changed().await.is_err() {
                    return false;
                }
            }
        }
    }
}
