// control_protocol.rs - End-to-end control protocol tests over loopback TCP

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use conway::{Grid, RunState, Simulation, TurnRequest, patterns};
use conway_rpc::{
    ClientError, ControlService, GameRequest, RpcClient, RpcServer, ServerConfig, ServiceError,
};
use tokio::task::JoinHandle;

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

fn random_game(width: usize, height: usize, threads: usize, turns: u32, seed: u64) -> GameRequest {
    let mut board = Grid::new(width, height).unwrap();
    patterns::random_fill(&mut board, seed);
    GameRequest { width, height, threads, turns, world: board.to_rows() }
}

fn glider_game(turns: u32, threads: usize) -> GameRequest {
    let mut board = Grid::new(16, 16).unwrap();
    patterns::GLIDER.place(&mut board, 1, 1);
    GameRequest { width: 16, height: 16, threads, turns, world: board.to_rows() }
}

async fn wait_for_turn(client: &RpcClient, at_least: u32) -> u32 {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(count) = client.alive_count().await {
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

fn is_remote(result: &Result<impl std::fmt::Debug, ClientError>, expected: ServiceError) -> bool {
    matches!(result, Err(ClientError::Remote(e)) if *e == expected)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_calls_before_run_game_fail_not_started() {
    let (addr, _server) = start_server().await;
    let client = RpcClient::connect(addr).await.unwrap();

    assert!(is_remote(&client.alive_count().await, ServiceError::NotStarted));
    assert!(is_remote(&client.board().await, ServiceError::NotStarted));
    assert!(is_remote(&client.change_state(RunState::Paused).await, ServiceError::NotStarted));
    assert!(is_remote(&client.shut_down().await, ServiceError::NotStarted));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invalid_parameters_rejected() {
    let (addr, _server) = start_server().await;
    let client = RpcClient::connect(addr).await.unwrap();

    let zero_threads = random_game(8, 8, 0, 5, 1);
    let err = client.run_game(zero_threads).await.unwrap_err();
    assert!(matches!(err, ClientError::Remote(ServiceError::InvalidParameter(_))));
    assert!(!err.is_transport());

    let too_many_threads = random_game(8, 8, 9, 5, 1);
    assert!(matches!(
        client.run_game(too_many_threads).await,
        Err(ClientError::Remote(ServiceError::InvalidParameter(_)))
    ));

    let mut ragged = random_game(8, 8, 2, 5, 1);
    ragged.world[3].pop();
    assert!(matches!(
        client.run_game(ragged).await,
        Err(ClientError::Remote(ServiceError::InvalidParameter(_)))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_remote_result_matches_local_engine_for_any_thread_count() {
    let (addr, _server) = start_server().await;
    let client = RpcClient::connect(addr).await.unwrap();

    let game = random_game(24, 18, 1, 40, 5);
    let local = Simulation::new(TurnRequest {
        width: 24,
        height: 18,
        threads: 1,
        turns: 40,
        board: Grid::from_rows(&game.world).unwrap(),
    })
    .unwrap();
    let conway::RunOutcome::Completed(expected) = local.run().await.unwrap() else {
        panic!("local run did not complete");
    };

    for threads in [1, 2, 4, 5, 7, 18] {
        let mut request = game.clone();
        request.threads = threads;
        let response = client.run_game(request).await.unwrap();
        assert_eq!(response.completed_turns, 40);
        assert_eq!(response.world, expected.board.to_rows(), "threads = {threads}");
        assert_eq!(response.alive, expected.alive, "threads = {threads}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_control_calls_while_running_then_shutdown() {
    let (addr, server) = start_server().await;
    let client = RpcClient::connect(addr)
        .await
        .unwrap()
        .with_request_timeout(Duration::from_secs(5));

    let run = tokio::spawn({
        let client = client.clone();
        async move { client.run_game(glider_game(u32::MAX, 4)).await }
    });

    // Polls share the connection with the blocked RunGame.
    wait_for_turn(&client, 5).await;
    let count = client.alive_count().await.unwrap();
    assert_eq!(count.alive, 5);

    let snapshot = client.board().await.unwrap();
    assert_eq!(snapshot.world.len(), 16);
    assert_eq!(Grid::from_rows(&snapshot.world).unwrap().alive_count(), 5);

    // A second controller cannot start another run.
    let other = RpcClient::connect(addr).await.unwrap();
    assert!(is_remote(&other.run_game(glider_game(1, 1)).await, ServiceError::AlreadyRunning));

    // Pause holds the turn counter still; resume continues from there.
    client.change_state(RunState::Paused).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let paused = client.alive_count().await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(client.alive_count().await.unwrap(), paused);

    let resumed = client.change_state(RunState::Executing).await.unwrap();
    assert_eq!(resumed.turn, paused.turn);
    wait_for_turn(&client, paused.turn + 4).await;

    client.shut_down().await.unwrap();
    let outcome = run.await.unwrap();
    assert!(matches!(outcome, Err(ClientError::Remote(ServiceError::AlreadyStopped))));

    // Nothing succeeds after shutdown: either the service refuses or the
    // server has already gone away.
    assert!(client.alive_count().await.is_err());

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not exit after shutdown")
        .unwrap();
    assert!(matches!(
        client.alive_count().await,
        Err(ClientError::ConnectionClosed | ClientError::Frame(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quit_while_paused_ends_run() {
    let (addr, server) = start_server().await;
    let client = RpcClient::connect(addr).await.unwrap();

    let run = tokio::spawn({
        let client = client.clone();
        async move { client.run_game(random_game(32, 32, 8, u32::MAX, 9)).await }
    });
    wait_for_turn(&client, 1).await;

    client.change_state(RunState::Paused).await.unwrap();
    client.change_state(RunState::Quitting).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(matches!(outcome, Err(ClientError::Remote(ServiceError::AlreadyStopped))));
    tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}
