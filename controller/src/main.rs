// main.rs - Controller binary

//! Game of Life controller.
//!
//! Loads or seeds a board, runs it on a compute server and reacts to keys
//! typed on stdin followed by Enter:
//!
//! - `s` - write the current board
//! - `p` - pause / resume
//! - `q` - stop the run and exit
//! - `k` - write the current board, shut the server down and exit
//!
//! ```bash
//! conway-controller --server 127.0.0.1:8030 --width 512 --height 512 --turns 1000
//! ```

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use conway::{Event, Grid, patterns};
use conway_controller::{BoardSource, Command, Controller, ControllerConfig, Params, PgmStore};
use conway_rpc::{DEFAULT_PORT, RpcClient};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "conway-controller")]
#[command(version, about, long_about = None)]
struct Args {
    /// Board width
    #[arg(long, default_value = "512")]
    width: usize,

    /// Board height
    #[arg(long, default_value = "512")]
    height: usize,

    /// Worker tasks per turn
    #[arg(long, default_value = "8")]
    threads: usize,

    /// Turns to run
    #[arg(long, default_value = "1000")]
    turns: u32,

    /// Compute server address
    #[arg(long, default_value_t = format!("127.0.0.1:{DEFAULT_PORT}"))]
    server: String,

    /// Directory holding `{width}x{height}.pgm` input images
    #[arg(long, default_value = "images")]
    images_dir: PathBuf,

    /// Directory boards are written to
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,

    /// Seed the board with a named pattern instead of an image
    #[arg(long, conflicts_with = "random_seed")]
    pattern: Option<String>,

    /// Seed the board randomly instead of from an image
    #[arg(long)]
    random_seed: Option<u64>,

    /// Milliseconds between alive-count polls
    #[arg(long, default_value = "2000")]
    poll_interval_ms: u64,

    /// Milliseconds before a control call is abandoned
    #[arg(long, default_value = "5000")]
    request_timeout_ms: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn initial_board(args: &Args, store: &PgmStore) -> anyhow::Result<Grid> {
    if let Some(name) = &args.pattern {
        let pattern = patterns::find(name).with_context(|| {
            let known: Vec<_> = patterns::PATTERNS.iter().map(|p| p.name).collect();
            format!("unknown pattern {name:?}, expected one of {}", known.join(", "))
        })?;
        let mut board = Grid::new(args.width, args.height)?;
        patterns::place_centered(&mut board, pattern);
        return Ok(board);
    }
    if let Some(seed) = args.random_seed {
        let mut board = Grid::new(args.width, args.height)?;
        patterns::random_fill(&mut board, seed);
        return Ok(board);
    }
    Ok(store.load(args.width, args.height)?)
}

/// Stdin is read on a plain thread; a blocked read must not hold up exit.
fn spawn_key_reader(commands: mpsc::Sender<Command>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            for key in line.chars().filter(|c| !c.is_whitespace()) {
                match Command::from_key(key) {
                    Some(command) => {
                        if commands.blocking_send(command).is_err() {
                            return;
                        }
                    }
                    None => eprintln!("unknown key {key:?}, use s, p, q or k"),
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = ControllerConfig {
        server_addr: args.server.clone(),
        params: Params {
            width: args.width,
            height: args.height,
            threads: args.threads,
            turns: args.turns,
        },
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        request_timeout: Duration::from_millis(args.request_timeout_ms),
        ..ControllerConfig::default()
    };

    let store = PgmStore::new(&args.images_dir, &args.out_dir);
    let board = initial_board(&args, &store).context("preparing initial board")?;

    let client = RpcClient::connect(config.server_addr.as_str())
        .await?
        .with_request_timeout(config.request_timeout);

    let (event_tx, mut event_rx) = mpsc::channel(1024);
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                Event::CellFlipped { .. } => debug!("{event}"),
                _ => info!("{event}"),
            }
        }
    });

    let (command_tx, command_rx) = mpsc::channel(16);
    spawn_key_reader(command_tx);

    let controller = Controller::new(config, client, Arc::new(store), event_tx);
    let outcome = controller.run(board, command_rx).await;
    if let Err(e) = printer.await {
        warn!(error = %e, "Event printer failed");
    }

    let summary = outcome.context("controller session failed")?;
    info!(turn = summary.turn, ending = ?summary.ending, "Controller exiting");
    Ok(())
}
