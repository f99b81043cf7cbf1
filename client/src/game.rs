//! Auto-play strategy: random placement, then hunt-and-target firing

use rand::seq::index::sample;
use rand::seq::IteratorRandom;
use rand::Rng;
use shared::{Cell, Mark, ObservationGrid, BOARD_CELLS, FLEET_SIZE};

const BOARD_WIDTH: usize = 8;

/// Picks 16 distinct cells uniformly at random
pub fn random_placement<R: Rng>(rng: &mut R) -> Vec<i64> {
    sample(rng, BOARD_CELLS, FLEET_SIZE)
        .into_iter()
        .map(|i| i as i64)
        .collect()
}

/// Orthogonal neighbours of a cell on the 8x8 board
pub fn neighbours(cell: Cell) -> Vec<Cell> {
    let (row, col) = (cell.index() / BOARD_WIDTH, cell.index() % BOARD_WIDTH);
    let mut result = Vec::with_capacity(4);
    if row > 0 {
        result.push(cell.index() - BOARD_WIDTH);
    }
    if row + 1 < BOARD_WIDTH {
        result.push(cell.index() + BOARD_WIDTH);
    }
    if col > 0 {
        result.push(cell.index() - 1);
    }
    if col + 1 < BOARD_WIDTH {
        result.push(cell.index() + 1);
    }
    result
        .into_iter()
        .filter_map(|i| Cell::new(i as i64))
        .collect()
}

/// Client-side view of the match used to choose the next shot
#[derive(Debug, Default)]
pub struct AutoPlayer {
    grid: ObservationGrid,
}

impl AutoPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the local grid with the authoritative one from the server
    pub fn observe(&mut self, grid: ObservationGrid) {
        self.grid = grid;
    }

    pub fn hits(&self) -> usize {
        self.grid.hit_count()
    }

    /// Unknown cells next to a known hit first, otherwise any unknown cell
    pub fn next_target<R: Rng>(&self, rng: &mut R) -> Option<Cell> {
        let frontier = Cell::all()
            .filter(|c| self.grid.get(*c) == Mark::Hit)
            .flat_map(neighbours)
            .filter(|c| self.grid.get(*c) == Mark::Unknown);

        frontier
            .choose(&mut *rng)
            .or_else(|| self.grid.unknown_cells().choose(rng))
    }
}
