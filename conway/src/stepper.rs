// stepper.rs - One generation of Life, split into row bands across worker tasks

use std::ops::Range;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::error::EngineError;
use crate::grid::{ALIVE, DEAD, Grid};

/// Life rule for a single cell given its live neighbour count.
pub fn next_state(alive: bool, neighbours: usize) -> bool {
    match (alive, neighbours) {
        (true, 2) | (true, 3) => true,   // Survival
        (false, 3)            => true,   // Birth
        _                     => false,  // Death or stays dead
    }
}

/// Split `[0, height)` into `threads` equal contiguous bands plus one trailing
/// band for the `height % threads` leftover rows.
///
/// `threads` is clamped to `1..=height`.
pub fn partition_rows(height: usize, threads: usize) -> Vec<Range<usize>> {
    let threads = threads.clamp(1, height.max(1));
    let band = height / threads;
    let mut bands: Vec<Range<usize>> = (0..threads).map(|i| i * band..(i + 1) * band).collect();
    let covered = band * threads;
    if covered < height {
        bands.push(covered..height);
    }
    bands
}

/// Band worker: computes rows `rows` of the next generation from `current`.
async fn process_band(rows: Range<usize>, current: Arc<Grid>) -> (Range<usize>, Vec<u8>) {
    let width = current.width();
    let mut band = Vec::with_capacity(rows.len() * width);
    for y in rows.clone() {
        for x in 0..width {
            let alive = next_state(current.is_alive(x, y), current.count_neighbours(x, y));
            band.push(if alive { ALIVE } else { DEAD });
        }
        tokio::task::yield_now().await;  // Let control-plane tasks in between rows
    }
    (rows, band)
}

/// Advance `current` by one turn using `threads` band workers.
///
/// Returns only after every worker has finished. Bands are disjoint, so the
/// result does not depend on the order in which workers complete.
pub async fn step(current: Arc<Grid>, threads: usize) -> Result<Grid, EngineError> {
    let mut workers = JoinSet::new();
    for rows in partition_rows(current.height(), threads) {
        workers.spawn(process_band(rows, Arc::clone(&current)));
    }

    let width = current.width();
    let mut next = Grid::new(width, current.height())?;
    while let Some(joined) = workers.join_next().await {
        let (rows, band) = joined.map_err(|e| EngineError::WorkerFailed(e.to_string()))?;
        next.cells_mut()[rows.start * width..rows.end * width].copy_from_slice(&band);
    }
    Ok(next)
}
