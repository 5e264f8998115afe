// controller.rs - One remote run: submit the board, poll progress, relay keypresses

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use conway::{Event, Grid, RunState};
use conway_rpc::{ClientError, GameRequest, GameResponse, RpcClient, ServiceError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::board_io::BoardSink;
use crate::config::{ControllerConfig, Params};
use crate::error::ControllerError;

/// Interactive requests, one per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Snapshot,
    Quit,
    TogglePause,
    Kill,
}

impl Command {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            's' => Some(Command::Snapshot),
            'q' => Some(Command::Quit),
            'p' => Some(Command::TogglePause),
            'k' => Some(Command::Kill),
            _ => None,
        }
    }
}

/// How a session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// Every requested turn ran.
    Completed,
    /// `Quit` stopped the run.
    Quit,
    /// `Kill` stopped the run and the server.
    Killed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Last turn known to have completed.
    pub turn: u32,
    /// Live cells on the final board; empty unless the run completed.
    pub alive: usize,
    pub ending: Ending,
}

pub struct Controller {
    config: ControllerConfig,
    client: RpcClient,
    sink: Arc<dyn BoardSink>,
    events: mpsc::Sender<Event>,
    last_turn: Arc<AtomicU32>,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        client: RpcClient,
        sink: Arc<dyn BoardSink>,
        events: mpsc::Sender<Event>,
    ) -> Self {
        Self { config, client, sink, events, last_turn: Arc::new(AtomicU32::new(0)) }
    }

    /// Run `board` remotely until it completes or a command stops it.
    ///
    /// `commands` is drained for the whole session; closing it just means no
    /// more keypresses. The event channel is closed when this returns.
    pub async fn run(
        self,
        board: Grid,
        mut commands: mpsc::Receiver<Command>,
    ) -> Result<RunSummary, ControllerError> {
        let params = self.config.params;
        for cell in board.alive_cells() {
            self.emit(Event::CellFlipped { turn: 0, cell }).await;
        }

        let request = GameRequest {
            width: params.width,
            height: params.height,
            threads: params.threads,
            turns: params.turns,
            world: board.to_rows(),
        };
        info!(
            width = params.width,
            height = params.height,
            threads = params.threads,
            turns = params.turns,
            "Starting remote run"
        );
        let mut game = tokio::spawn({
            let client = self.client.clone();
            async move { client.run_game(request).await }
        });

        let (finished_tx, finished_rx) = watch::channel(false);
        let poller = tokio::spawn(poll_alive_count(
            self.client.clone(),
            self.config.clone(),
            self.events.clone(),
            Arc::clone(&self.last_turn),
            finished_rx,
        ));

        let mut paused = false;
        let mut commands_open = true;
        let mut stop: Option<Ending> = None;
        let joined = loop {
            tokio::select! {
                joined = &mut game => break joined,
                command = commands.recv(), if commands_open && stop.is_none() => {
                    let Some(command) = command else {
                        debug!("Command channel closed");
                        commands_open = false;
                        continue;
                    };
                    if let Some((ending, delivered)) = self.dispatch(command, &mut paused).await {
                        stop = Some(ending);
                        if !delivered {
                            game.abort();
                        }
                    }
                }
            }
        };

        let _ = finished_tx.send(true);
        if let Err(e) = poller.await {
            warn!(error = %e, "Poller task failed");
        }

        let summary = match (joined, stop) {
            (Ok(Ok(response)), _) => self.finish(params, response).await?,
            // The reply to a stopped run is AlreadyStopped, or nothing at all
            // if the server went away first.
            (Ok(Err(e)), Some(ending))
                if e.is_transport() || matches!(e, ClientError::Remote(ServiceError::AlreadyStopped)) =>
            {
                debug!(error = %e, "RunGame ended after stop request");
                self.stopped(ending)
            }
            (Err(e), Some(ending)) => {
                debug!(error = %e, "RunGame call abandoned");
                self.stopped(ending)
            }
            (Ok(Err(e)), _) => return Err(ControllerError::RunFailed(e)),
            (Err(e), None) => return Err(ControllerError::Task(e.to_string())),
        };

        self.emit(Event::StateChange { turn: summary.turn, new_state: RunState::Quitting }).await;
        Ok(summary)
    }

    /// Carry out one command. Returns how the session should end, and whether
    /// the server acknowledged the stop, for `Quit` and `Kill`.
    async fn dispatch(&self, command: Command, paused: &mut bool) -> Option<(Ending, bool)> {
        debug!(?command, "Dispatching command");
        match command {
            Command::Snapshot => {
                self.snapshot().await;
                None
            }
            Command::TogglePause => {
                let next = if *paused { RunState::Executing } else { RunState::Paused };
                match self.client.change_state(next).await {
                    Ok(changed) => {
                        *paused = !*paused;
                        self.observe_turn(changed.turn);
                        info!(turn = changed.turn, "{}", if *paused { "Paused" } else { "Continuing" });
                        self.emit(Event::StateChange { turn: changed.turn, new_state: next }).await;
                    }
                    Err(e) => warn!(error = %e, state = %next, "ChangeState failed"),
                }
                None
            }
            Command::Quit => {
                let delivered = match self.client.change_state(RunState::Quitting).await {
                    Ok(changed) => {
                        self.observe_turn(changed.turn);
                        true
                    }
                    Err(e) => {
                        warn!(error = %e, "Quit request failed, leaving anyway");
                        false
                    }
                };
                Some((Ending::Quit, delivered))
            }
            Command::Kill => {
                self.snapshot().await;
                let delivered = match self.client.shut_down().await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "ShutDown failed, leaving anyway");
                        false
                    }
                };
                Some((Ending::Killed, delivered))
            }
        }
    }

    /// GetBoard and hand the result to the sink. Failures are logged.
    async fn snapshot(&self) {
        let response = match self.client.board().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "GetBoard failed");
                return;
            }
        };
        self.observe_turn(response.turn);
        let board = match Grid::from_rows(&response.world) {
            Ok(board) => board,
            Err(e) => {
                warn!(error = %e, turn = response.turn, "Server sent an unusable board");
                return;
            }
        };
        if let Err(e) = self.save(board, response.turn).await {
            warn!(error = %e, turn = response.turn, "Snapshot not saved");
        }
    }

    async fn save(&self, board: Grid, turn: u32) -> Result<(), ControllerError> {
        let name = self.config.params.output_name(turn);
        let sink = Arc::clone(&self.sink);
        let filename = tokio::task::spawn_blocking(move || sink.save(&name, &board))
            .await
            .map_err(|e| ControllerError::Task(e.to_string()))??;
        info!(turn, %filename, "Board written");
        self.emit(Event::ImageOutputComplete { turn, filename }).await;
        Ok(())
    }

    async fn finish(&self, params: Params, response: GameResponse) -> Result<RunSummary, ControllerError> {
        let turn = response.completed_turns;
        self.observe_turn(turn);
        let board = Grid::from_rows(&response.world)?;
        if (board.width(), board.height()) != (params.width, params.height) {
            return Err(ControllerError::Task(format!(
                "final board is {}x{}, expected {}x{}",
                board.width(),
                board.height(),
                params.width,
                params.height
            )));
        }

        self.save(board, turn).await?;
        let alive = response.alive.len();
        info!(turn, alive, "Run complete");
        self.emit(Event::FinalTurnComplete { turn, alive: response.alive }).await;
        Ok(RunSummary { turn, alive, ending: Ending::Completed })
    }

    fn stopped(&self, ending: Ending) -> RunSummary {
        let turn = self.last_turn();
        info!(turn, ?ending, "Run stopped on request");
        RunSummary { turn, alive: 0, ending }
    }

    fn observe_turn(&self, turn: u32) {
        self.last_turn.fetch_max(turn, Ordering::Relaxed);
    }

    fn last_turn(&self) -> u32 {
        self.last_turn.load(Ordering::Relaxed)
    }

    async fn emit(&self, event: Event) {
        if self.events.send(event).await.is_err() {
            debug!("Event consumer gone");
        }
    }
}

/// Ask for the alive count every `poll_interval` until `finished` flips.
async fn poll_alive_count(
    client: RpcClient,
    config: ControllerConfig,
    events: mpsc::Sender<Event>,
    last_turn: Arc<AtomicU32>,
    mut finished: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = finished.wait_for(|done| *done) => break,
            _ = ticker.tick() => {}
        }

        let mut attempt = 0;
        let result = loop {
            match client.alive_count().await {
                Err(e) if e.is_transport() && attempt < config.poll_retries => {
                    attempt += 1;
                    debug!(attempt, error = %e, "Retrying GetAliveCount");
                }
                other => break other,
            }
        };

        match result {
            Ok(count) => {
                last_turn.fetch_max(count.turn, Ordering::Relaxed);
                debug!(turn = count.turn, alive = count.alive, "Polled alive count");
                let event = Event::AliveCellsCount { turn: count.turn, count: count.alive };
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "GetAliveCount failed, skipping"),
        }
    }
}
