// session.rs - Controller sessions against in-process and misbehaving servers

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use conway::{Event, Grid, RunState, patterns};
use conway_controller::{
    BoardIoError, BoardSink, Command, Controller, ControllerConfig, ControllerError, Ending, Params,
};
use conway_rpc::wire::{Envelope, MAX_FRAME_SIZE, read_frame, write_frame};
use conway_rpc::{
    AliveCountResponse, BoardResponse, ClientError, ControlService, Request, Response, RpcClient,
    RpcServer, ServerConfig, ServiceError,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Keeps every saved board in memory.
#[derive(Default)]
struct MemorySink {
    saved: Mutex<Vec<(String, Grid)>>,
}

impl MemorySink {
    fn saved(&self) -> Vec<(String, Grid)> {
        self.saved.lock().unwrap().clone()
    }
}

impl BoardSink for MemorySink {
    fn save(&self, name: &str, board: &Grid) -> Result<String, BoardIoError> {
        self.saved.lock().unwrap().push((name.to_string(), board.clone()));
        Ok(format!("mem:{name}"))
    }
}

async fn start_server() -> (SocketAddr, JoinHandle<()>) {
    let config = ServerConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        shutdown_grace: Duration::from_secs(2),
    };
    let server = RpcServer::bind(config, Arc::new(ControlService::new())).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = tokio::spawn(async move { server.serve().await.unwrap() });
    (addr, handle)
}

fn glider_board() -> Grid {
    let mut board = Grid::new(16, 16).unwrap();
    patterns::GLIDER.place(&mut board, 1, 1);
    board
}

/// A server that answers only every other GetAliveCount, leaves RunGame
/// and ShutDown unanswered, and optionally hangs up after `hang_up_after`
/// polls. Returns the number of polls it has seen.
async fn start_flaky_server(hang_up_after: Option<usize>) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let polls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&polls);

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        while let Ok(Some(Envelope { id, body })) =
            read_frame::<_, Envelope<Request>>(&mut reader, MAX_FRAME_SIZE).await
        {
            let reply = match body {
                Request::GetAliveCount => {
                    let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                    if hang_up_after.is_some_and(|limit| n >= limit) {
                        return;
                    }
                    (n % 2 == 0).then(|| {
                        Response::AliveCount(AliveCountResponse { turn: n as u32, alive: 5 })
                    })
                }
                Request::GetBoard => Some(Response::Board(BoardResponse {
                    turn: 7,
                    world: glider_board().to_rows(),
                })),
                _ => None,
            };
            if let Some(body) = reply {
                write_frame(&mut writer, &Envelope { id, body }).await.unwrap();
            }
        }
    });
    (addr, polls)
}

async fn new_controller(
    addr: SocketAddr,
    threads: usize,
    turns: u32,
) -> (Controller, Arc<MemorySink>, mpsc::Receiver<Event>) {
    let config = ControllerConfig {
        server_addr: addr.to_string(),
        params: Params { width: 16, height: 16, threads, turns },
        poll_interval: Duration::from_millis(10),
        request_timeout: Duration::from_secs(5),
        poll_retries: 1,
    };
    controller_with(config).await
}

async fn controller_with(
    config: ControllerConfig,
) -> (Controller, Arc<MemorySink>, mpsc::Receiver<Event>) {
    let addr: SocketAddr = config.server_addr.parse().unwrap();
    let client = RpcClient::connect(addr)
        .await
        .unwrap()
        .with_request_timeout(config.request_timeout);
    let sink = Arc::new(MemorySink::default());
    let (event_tx, event_rx) = mpsc::channel(4096);
    let controller = Controller::new(config, client, sink.clone(), event_tx);
    (controller, sink, event_rx)
}

async fn drain(mut events: mpsc::Receiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event);
    }
    seen
}

async fn wait_for_turn(addr: SocketAddr, at_least: u32) -> u32 {
    let probe = RpcClient::connect(addr).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(count) = probe.alive_count().await {
                if count.turn >= at_least {
                    return count.turn;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("simulation did not advance")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_completed_run_writes_final_board_and_reports() {
    let (addr, _server) = start_server().await;
    let (controller, sink, events) = new_controller(addr, 4, 20).await;
    let (_command_tx, command_rx) = mpsc::channel(4);

    let collector = tokio::spawn(drain(events));
    let summary = controller.run(glider_board(), command_rx).await.unwrap();
    let events = collector.await.unwrap();

    assert_eq!(summary.ending, Ending::Completed);
    assert_eq!(summary.turn, 20);
    assert_eq!(summary.alive, 5);

    // The initial board is announced cell by cell.
    let flipped = events
        .iter()
        .filter(|e| matches!(e, Event::CellFlipped { turn: 0, .. }))
        .count();
    assert_eq!(flipped, 5);

    // Four turns move a glider one cell diagonally.
    let mut expected = Grid::new(16, 16).unwrap();
    patterns::GLIDER.place(&mut expected, 6, 6);
    let saved = sink.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, "16x16x20");
    assert_eq!(saved[0].1, expected);

    assert!(events.contains(&Event::ImageOutputComplete {
        turn: 20,
        filename: "mem:16x16x20".to_string(),
    }));
    assert!(events.contains(&Event::FinalTurnComplete { turn: 20, alive: expected.alive_cells() }));
    assert_eq!(
        events.last(),
        Some(&Event::StateChange { turn: 20, new_state: RunState::Quitting })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pause_snapshot_then_kill_stops_server() {
    let (addr, server) = start_server().await;
    let (controller, sink, events) = new_controller(addr, 3, u32::MAX).await;
    let (command_tx, command_rx) = mpsc::channel(4);

    let collector = tokio::spawn(drain(events));
    let session = tokio::spawn(controller.run(glider_board(), command_rx));
    wait_for_turn(addr, 3).await;

    command_tx.send(Command::TogglePause).await.unwrap();
    // A step already under way when the pause lands still completes.
    tokio::time::sleep(Duration::from_millis(50)).await;
    command_tx.send(Command::Snapshot).await.unwrap();
    command_tx.send(Command::Kill).await.unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(10), session)
        .await
        .expect("controller did not exit after kill")
        .unwrap()
        .unwrap();
    let events = collector.await.unwrap();
    assert_eq!(summary.ending, Ending::Killed);

    let paused_at = events
        .iter()
        .find_map(|e| match e {
            Event::StateChange { turn, new_state: RunState::Paused } => Some(*turn),
            _ => None,
        })
        .expect("no pause event");

    // Both boards were taken while paused, so they are the same turn.
    let written: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            Event::ImageOutputComplete { turn, .. } => Some(*turn),
            _ => None,
        })
        .collect();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0], written[1]);
    assert!(written[0] >= paused_at);

    let saved = sink.saved();
    assert_eq!(saved.len(), 2);
    let name = format!("16x16x{}", written[0]);
    assert!(saved.iter().all(|(n, _)| *n == name));
    assert_eq!(saved[0].1, saved[1].1);
    assert_eq!(saved[0].1.alive_count(), 5);

    assert!(!events.iter().any(|e| matches!(e, Event::FinalTurnComplete { .. })));
    assert_eq!(summary.turn, written[0]);
    assert_eq!(
        events.last(),
        Some(&Event::StateChange { turn: written[0], new_state: RunState::Quitting })
    );

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not exit after kill")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_polls_report_alive_count_until_quit() {
    let (addr, server) = start_server().await;
    let (controller, sink, mut events) = new_controller(addr, 2, u32::MAX).await;
    let (command_tx, command_rx) = mpsc::channel(4);

    let session = tokio::spawn(controller.run(glider_board(), command_rx));

    let polled = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Some(Event::AliveCellsCount { turn, count }) if turn > 0 => break (turn, count),
                Some(_) => {}
                None => panic!("events closed before any poll"),
            }
        }
    })
    .await
    .expect("no alive count polled");
    assert_eq!(polled.1, 5);

    command_tx.send(Command::Quit).await.unwrap();
    let rest = drain(events).await;
    let summary = session.await.unwrap().unwrap();

    assert_eq!(summary.ending, Ending::Quit);
    assert!(summary.turn >= polled.0);
    assert!(sink.saved().is_empty());
    assert!(matches!(
        rest.last(),
        Some(Event::StateChange { new_state: RunState::Quitting, .. })
    ));

    tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rejected_run_game_fails_session() {
    let (addr, _server) = start_server().await;
    let (controller, sink, events) = new_controller(addr, 0, 10).await;
    let (_command_tx, command_rx) = mpsc::channel(4);

    let collector = tokio::spawn(drain(events));
    let err = controller.run(glider_board(), command_rx).await.unwrap_err();
    assert!(matches!(
        err,
        ControllerError::RunFailed(ClientError::Remote(ServiceError::InvalidParameter(_)))
    ));

    let events = collector.await.unwrap();
    assert!(!events.iter().any(|e| matches!(e, Event::StateChange { .. })));
    assert!(sink.saved().is_empty());
}

fn flaky_config(addr: SocketAddr, poll_retries: u32) -> ControllerConfig {
    ControllerConfig {
        server_addr: addr.to_string(),
        params: Params { width: 16, height: 16, threads: 2, turns: u32::MAX },
        poll_interval: Duration::from_millis(10),
        request_timeout: Duration::from_millis(50),
        poll_retries,
    }
}

/// Collect events until `wanted` alive counts have arrived.
async fn wait_for_counts(events: &mut mpsc::Receiver<Event>, wanted: usize) -> Vec<u32> {
    let mut turns = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while turns.len() < wanted {
            match events.recv().await {
                Some(Event::AliveCellsCount { turn, count }) => {
                    assert_eq!(count, 5);
                    turns.push(turn);
                }
                Some(_) => {}
                None => panic!("events closed while polling"),
            }
        }
    })
    .await
    .expect("polling stalled");
    turns
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timed_out_poll_is_retried_then_kill_exits_without_ack() {
    let (addr, polls) = start_flaky_server(None).await;
    let (controller, sink, mut events) = controller_with(flaky_config(addr, 1)).await;
    let (command_tx, command_rx) = mpsc::channel(4);
    let session = tokio::spawn(controller.run(glider_board(), command_rx));

    // Every tick's first attempt times out and its retry is answered, so each
    // count costs two polls and none are lost.
    let turns = wait_for_counts(&mut events, 3).await;
    assert!(turns.iter().all(|t| t % 2 == 0));
    assert!(polls.load(Ordering::SeqCst) >= 2 * turns.len());

    // ShutDown is never acknowledged; the controller leaves anyway.
    command_tx.send(Command::Kill).await.unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(5), session)
        .await
        .expect("controller did not exit after an unacknowledged kill")
        .unwrap()
        .unwrap();
    assert_eq!(summary.ending, Ending::Killed);
    assert!(summary.turn >= 7);

    let saved = sink.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, "16x16x7");

    let rest = drain(events).await;
    assert!(matches!(
        rest.last(),
        Some(Event::StateChange { new_state: RunState::Quitting, .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_polls_are_skipped_without_retries() {
    let (addr, polls) = start_flaky_server(None).await;
    let (controller, _sink, mut events) = controller_with(flaky_config(addr, 0)).await;
    let (command_tx, command_rx) = mpsc::channel(4);
    let session = tokio::spawn(controller.run(glider_board(), command_rx));

    // Half the ticks time out and are dropped; polling carries on regardless.
    let turns = wait_for_counts(&mut events, 3).await;
    assert!(turns.windows(2).all(|w| w[1] >= w[0] + 2));
    assert!(polls.load(Ordering::SeqCst) >= 2 * turns.len() - 1);

    command_tx.send(Command::Quit).await.unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(5), session)
        .await
        .expect("controller did not exit after quit")
        .unwrap()
        .unwrap();
    assert_eq!(summary.ending, Ending::Quit);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lost_connection_fails_run_game() {
    let (addr, _polls) = start_flaky_server(Some(4)).await;
    let (controller, _sink, events) = controller_with(flaky_config(addr, 1)).await;
    let (_command_tx, command_rx) = mpsc::channel(4);

    let collector = tokio::spawn(drain(events));
    let err = tokio::time::timeout(Duration::from_secs(5), controller.run(glider_board(), command_rx))
        .await
        .expect("controller did not notice the dropped connection")
        .unwrap_err();
    assert!(matches!(err, ControllerError::RunFailed(ClientError::ConnectionClosed)));

    let events = collector.await.unwrap();
    assert!(!events.iter().any(|e| matches!(e, Event::StateChange { .. })));
}
