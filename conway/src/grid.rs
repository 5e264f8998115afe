// grid.rs - Toroidal grid type for Conway's Game of Life

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ALIVE: u8 = 255;                      // Live cell byte (matches PGM white)
pub const DEAD: u8 = 0;                         // Dead cell byte

/// Offsets of the 8 neighbours as (dy, dx).
const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1), (-1, 0), (-1, 1),
    ( 0, -1),          ( 0, 1),
    ( 1, -1), ( 1, 0), ( 1, 1),
];

/// A cell coordinate, x in [0, width), y in [0, height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
}

impl Cell {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("grid dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("expected {expected} cells, got {actual}")]
    CellCount { expected: usize, actual: usize },

    #[error("row {row} has {actual} cells, expected {expected}")]
    RaggedRow { row: usize, expected: usize, actual: usize },

    #[error("cell ({x}, {y}) holds {value}, expected 0 or 255")]
    InvalidCell { x: usize, y: usize, value: u8 },
}

/// Fixed-size `height x width` byte matrix whose edges wrap around.
///
/// Cells are stored row-major; every byte is either [`ALIVE`] or [`DEAD`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl Grid {
    /// An all-dead grid.
    pub fn new(width: usize, height: usize) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height, cells: vec![DEAD; width * height] })
    }

    /// Build a grid from a row-major byte buffer, validating every byte.
    pub fn from_cells(width: usize, height: usize, cells: Vec<u8>) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::InvalidDimensions { width, height });
        }
        if cells.len() != width * height {
            return Err(GridError::CellCount { expected: width * height, actual: cells.len() });
        }
        if let Some(i) = cells.iter().position(|&c| c != ALIVE && c != DEAD) {
            return Err(GridError::InvalidCell { x: i % width, y: i / width, value: cells[i] });
        }
        Ok(Self { width, height, cells })
    }

    /// Build a grid from nested rows, the shape board ingestion hands over.
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self, GridError> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if width == 0 || height == 0 {
            return Err(GridError::InvalidDimensions { width, height });
        }
        let mut cells = Vec::with_capacity(width * height);
        for (row, r) in rows.iter().enumerate() {
            if r.len() != width {
                return Err(GridError::RaggedRow { row, expected: width, actual: r.len() });
            }
            cells.extend_from_slice(r);
        }
        Self::from_cells(width, height, cells)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.cells[y * self.width + x]
    }

    pub fn is_alive(&self, x: usize, y: usize) -> bool {
        self.get(x, y) == ALIVE
    }

    /// Set a cell; coordinates wrap so patterns can be placed across edges.
    pub fn set_alive(&mut self, x: usize, y: usize, alive: bool) {
        let (x, y) = (x % self.width, y % self.height);
        self.cells[y * self.width + x] = if alive { ALIVE } else { DEAD };
    }

    /// Number of live cells among the 8 toroidally wrapped neighbours of (x, y).
    pub fn count_neighbours(&self, x: usize, y: usize) -> usize {
        let (w, h) = (self.width as isize, self.height as isize);
        NEIGHBOURS
            .iter()
            .filter(|&&(dy, dx)| {
                let ny = (y as isize + dy).rem_euclid(h) as usize;
                let nx = (x as isize + dx).rem_euclid(w) as usize;
                self.cells[ny * self.width + nx] == ALIVE
            })
            .count()
    }

    /// The bytes of row `y`.
    pub fn row(&self, y: usize) -> &[u8] {
        &self.cells[y * self.width..(y + 1) * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.cells.chunks_exact(self.width)
    }

    /// Copy out as nested rows, the shape board emission expects.
    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.rows().map(<[u8]>::to_vec).collect()
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [u8] {
        &mut self.cells
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == ALIVE).count()
    }

    /// Live cells in row-major order (y ascending, then x ascending).
    pub fn alive_cells(&self) -> Vec<Cell> {
        self.cells
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c == ALIVE)
            .map(|(i, _)| Cell::new(i % self.width, i / self.width))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_with(width: usize, height: usize, alive: &[(usize, usize)]) -> Grid {
        let mut grid = Grid::new(width, height).unwrap();
        for &(x, y) in alive {
            grid.set_alive(x, y, true);
        }
        grid
    }

    #[test]
    fn test_rejects_zero_dimensions() {
        assert_eq!(
            Grid::new(0, 4),
            Err(GridError::InvalidDimensions { width: 0, height: 4 })
        );
        assert!(Grid::from_rows(&[]).is_err());
    }

    #[test]
    fn test_from_rows_validates_shape_and_bytes() {
        let ragged = vec![vec![0, 0, 0], vec![0, 0]];
        assert_eq!(
            Grid::from_rows(&ragged),
            Err(GridError::RaggedRow { row: 1, expected: 3, actual: 2 })
        );

        let bad_byte = vec![vec![0, 0], vec![0, 7]];
        assert_eq!(
            Grid::from_rows(&bad_byte),
            Err(GridError::InvalidCell { x: 1, y: 1, value: 7 })
        );

        let ok = vec![vec![255, 0, 0], vec![0, 0, 255]];
        let grid = Grid::from_rows(&ok).unwrap();
        assert_eq!((grid.width(), grid.height()), (3, 2));
        assert!(grid.is_alive(0, 0));
        assert!(grid.is_alive(2, 1));
    }

    #[test]
    fn test_count_neighbours_interior() {
        let grid = grid_with(5, 5, &[(1, 1), (2, 1), (3, 1), (2, 2)]);
        assert_eq!(grid.count_neighbours(2, 2), 3);
        assert_eq!(grid.count_neighbours(2, 1), 3);
        assert_eq!(grid.count_neighbours(0, 4), 0);
    }

    #[test]
    fn test_count_neighbours_wraps_corners() {
        // Three cells in the other corners all touch (0, 0) through the wrap.
        let grid = grid_with(6, 4, &[(5, 3), (5, 0), (0, 3)]);
        assert_eq!(grid.count_neighbours(0, 0), 3);
        assert_eq!(grid.count_neighbours(5, 3), 2);
    }

    #[test]
    fn test_count_neighbours_ignores_self() {
        let grid = grid_with(3, 3, &[(1, 1)]);
        assert_eq!(grid.count_neighbours(1, 1), 0);
    }

    #[test]
    fn test_alive_cells_row_major() {
        let grid = grid_with(4, 3, &[(3, 0), (0, 2), (1, 0), (2, 1)]);
        assert_eq!(
            grid.alive_cells(),
            vec![Cell::new(1, 0), Cell::new(3, 0), Cell::new(2, 1), Cell::new(0, 2)]
        );
        assert_eq!(grid.alive_count(), 4);
    }

    #[test]
    fn test_set_alive_wraps() {
        let grid = grid_with(4, 4, &[(5, 6)]);
        assert!(grid.is_alive(1, 2));
    }
}
