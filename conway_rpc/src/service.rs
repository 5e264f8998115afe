// service.rs - Control service: maps protocol operations onto the running `Simulation`
//
// The service keeps no simulation data of its own. It holds a handle to the
// current run (if any) and forwards each call to the engine's snapshot and
// state-change accessors.

use conway::{Grid, RunOutcome, RunState, Simulation, TurnRequest};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::wire::{
    AliveCountResponse, BoardResponse, ChangeStateResponse, GameRequest, GameResponse, Request,
    Response,
};

/// Which run, if any, control calls are routed to.
#[derive(Debug)]
enum Session {
    Idle,
    Running(Arc<Simulation>),
    Stopped,
}

#[derive(Debug)]
pub struct ControlService {
    session: Mutex<Session>,
    stopped: watch::Sender<bool>,
}

impl Default for ControlService {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlService {
    pub fn new() -> Self {
        let (stopped, _) = watch::channel(false);
        Self { session: Mutex::new(Session::Idle), stopped }
    }

    /// Flips to `true` once a stopped run has returned its reply; the server
    /// exits on it.
    pub fn stopped(&self) -> watch::Receiver<bool> {
        self.stopped.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        matches!(*self.session(), Session::Stopped)
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        // The session is a plain enum swap; a panic elsewhere cannot leave it
        // half written.
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active(&self) -> Result<Arc<Simulation>, ServiceError> {
        match &*self.session() {
            Session::Idle => Err(ServiceError::NotStarted),
            Session::Running(sim) => Ok(Arc::clone(sim)),
            Session::Stopped => Err(ServiceError::AlreadyStopped),
        }
    }

    /// Dispatch one protocol request.
    pub async fn handle(&self, request: Request) -> Response {
        let result = match request {
            Request::RunGame(game) => self.run_game(game).await.map(Response::Game),
            Request::GetAliveCount => self.alive_count().map(Response::AliveCount),
            Request::GetBoard => self.board().map(Response::Board),
            Request::ChangeState { state } => self.change_state(state).map(Response::StateChanged),
            Request::ShutDown => self.shut_down().map(|()| Response::ShutDownAck),
        };
        result.unwrap_or_else(Response::Error)
    }

    /// Validate, start and run a simulation to completion.
    pub async fn run_game(&self, game: GameRequest) -> Result<GameResponse, ServiceError> {
        match &*self.session() {
            Session::Idle => {}
            Session::Running(_) => return Err(ServiceError::AlreadyRunning),
            Session::Stopped => return Err(ServiceError::AlreadyStopped),
        }

        let board = Grid::from_rows(&game.world)
            .map_err(|e| ServiceError::InvalidParameter(e.to_string()))?;
        let sim = Arc::new(Simulation::new(TurnRequest {
            width: game.width,
            height: game.height,
            threads: game.threads,
            turns: game.turns,
            board,
        })?);

        {
            let mut session = self.session();
            match &*session {
                Session::Idle => *session = Session::Running(Arc::clone(&sim)),
                Session::Running(_) => return Err(ServiceError::AlreadyRunning),
                Session::Stopped => return Err(ServiceError::AlreadyStopped),
            }
        }

        let outcome = sim.run().await;

        let mut session = self.session();
        let stopped = matches!(*session, Session::Stopped)
            || matches!(outcome, Ok(RunOutcome::Stopped { .. }));
        if stopped {
            *session = Session::Stopped;
            drop(session);
            info!(turn = sim.current_turn(), "Run ended by shutdown request");
            self.stopped.send_replace(true);
            return Err(ServiceError::AlreadyStopped);
        }
        *session = Session::Idle;
        drop(session);

        match outcome {
            Ok(RunOutcome::Completed(result)) => Ok(GameResponse {
                world: result.board.to_rows(),
                completed_turns: result.completed_turns,
                alive: result.alive,
            }),
            Ok(RunOutcome::Stopped { .. }) => Err(ServiceError::AlreadyStopped),
            Err(e) => {
                warn!(error = %e, "Simulation failed");
                Err(e.into())
            }
        }
    }

    pub fn alive_count(&self) -> Result<AliveCountResponse, ServiceError> {
        let count = self.active()?.snapshot_alive_count();
        Ok(AliveCountResponse { turn: count.turn, alive: count.alive })
    }

    pub fn board(&self) -> Result<BoardResponse, ServiceError> {
        let snapshot = self.active()?.snapshot_board();
        Ok(BoardResponse { turn: snapshot.turn, world: snapshot.board.to_rows() })
    }

    pub fn change_state(&self, state: RunState) -> Result<ChangeStateResponse, ServiceError> {
        let turn = self.steer(state)?;
        Ok(ChangeStateResponse { turn })
    }

    /// Ask the running simulation to stop at its next turn boundary.
    pub fn shut_down(&self) -> Result<(), ServiceError> {
        let turn = self.steer(RunState::Quitting)?;
        info!(turn, "Shutdown requested");
        Ok(())
    }

    /// Apply `state` to the active run. The session lock is held throughout,
    /// so a run finishing concurrently either sees `Stopped` or has already
    /// gone back to `Idle`.
    fn steer(&self, state: RunState) -> Result<u32, ServiceError> {
        let mut session = self.session();
        let sim = match &*session {
            Session::Idle => return Err(ServiceError::NotStarted),
            Session::Running(sim) => Arc::clone(sim),
            Session::Stopped => return Err(ServiceError::AlreadyStopped),
        };
        let turn = sim.change_state(state)?;
        if state.is_terminal() {
            *session = Session::Stopped;
        }
        Ok(turn)
    }
}
