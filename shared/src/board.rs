//! Board model shared by the server and clients
//!
//! The board is an 8x8 grid addressed by a flat index in `0..64`. A player's
//! hidden [`Placement`] marks 16 of those cells, and each player accumulates an
//! [`ObservationGrid`] recording what their attacks have revealed about the
//! opponent's placement.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Number of cells on the board
pub const BOARD_CELLS: usize = 64;
/// Number of target cells every placement must contain
pub const FLEET_SIZE: usize = 16;

/// A validated board cell index in `0..BOARD_CELLS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Cell(u8);

impl Cell {
    /// Returns the cell for `index`, or `None` if it lies outside the board
    pub fn new(index: i64) -> Option<Self> {
        if (0..BOARD_CELLS as i64).contains(&index) {
            Some(Cell(index as u8))
        } else {
            None
        }
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterates every cell on the board in index order
    pub fn all() -> impl Iterator<Item = Cell> {
        (0..BOARD_CELLS as u8).map(Cell)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Cell {
    type Error = PlacementError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Cell::new(value).ok_or(PlacementError::OutOfRange(value))
    }
}

impl From<Cell> for i64 {
    fn from(cell: Cell) -> Self {
        cell.0 as i64
    }
}

/// Reasons a placement is rejected at registration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("placement must contain exactly {expected} cells, got {actual}")]
    WrongSize { expected: usize, actual: usize },
    #[error("placement contains cell {0} more than once")]
    Duplicate(i64),
    #[error("cell {0} is outside the board (0-63)")]
    OutOfRange(i64),
}

/// A player's hidden set of target cells
///
/// Always holds exactly [`FLEET_SIZE`] distinct cells. The set is immutable
/// once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    cells: BTreeSet<Cell>,
}

impl Placement {
    /// Validates raw cell indices into a placement
    ///
    /// Size is checked first, then every value in order, so the reported
    /// error names the first offending value.
    pub fn new(values: &[i64]) -> Result<Self, PlacementError> {
        if values.len() != FLEET_SIZE {
            return Err(PlacementError::WrongSize {
                expected: FLEET_SIZE,
                actual: values.len(),
            });
        }

        let mut cells = BTreeSet::new();
        for &value in values {
            let cell = Cell::try_from(value)?;
            if !cells.insert(cell) {
                return Err(PlacementError::Duplicate(value));
            }
        }

        Ok(Self { cells })
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.contains(&cell)
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.cells.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Outcome of firing at `cell` against this placement
    pub fn mark_for(&self, cell: Cell) -> Mark {
        if self.contains(cell) {
            Mark::Hit
        } else {
            Mark::Miss
        }
    }
}

/// What a player knows about one opposing cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mark {
    Miss,
    #[default]
    Unknown,
    Hit,
}

impl Mark {
    pub fn value(self) -> i8 {
        match self {
            Mark::Miss => -1,
            Mark::Unknown => 0,
            Mark::Hit => 1,
        }
    }
}

impl TryFrom<i8> for Mark {
    type Error = GridError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Mark::Miss),
            0 => Ok(Mark::Unknown),
            1 => Ok(Mark::Hit),
            other => Err(GridError::InvalidMark(other)),
        }
    }
}

/// Reasons a decoded observation grid is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid must have {BOARD_CELLS} slots, got {0}")]
    WrongSize(usize),
    #[error("grid value {0} is not one of -1, 0, 1")]
    InvalidMark(i8),
    #[error("grid records {0} hits, more than the {FLEET_SIZE} possible")]
    TooManyHits(usize),
}

/// A 64-slot record of attack outcomes against the opponent
///
/// Serialized as a flat array of `-1`/`0`/`1`. Recording an outcome overwrites
/// the slot, so re-attacking a cell never inflates the hit count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<i8>", into = "Vec<i8>")]
pub struct ObservationGrid {
    marks: [Mark; BOARD_CELLS],
}

impl ObservationGrid {
    pub fn new() -> Self {
        Self {
            marks: [Mark::Unknown; BOARD_CELLS],
        }
    }

    pub fn get(&self, cell: Cell) -> Mark {
        self.marks[cell.index()]
    }

    pub fn record(&mut self, cell: Cell, mark: Mark) {
        self.marks[cell.index()] = mark;
    }

    /// Number of cells recorded as hits
    pub fn hit_count(&self) -> usize {
        self.marks.iter().filter(|m| **m == Mark::Hit).count()
    }

    /// Cells that have not been fired at yet
    pub fn unknown_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        Cell::all().filter(|cell| self.get(*cell) == Mark::Unknown)
    }

    pub fn values(&self) -> Vec<i8> {
        self.marks.iter().map(|m| m.value()).collect()
    }
}

impl Default for ObservationGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Vec<i8>> for ObservationGrid {
    type Error = GridError;

    fn try_from(values: Vec<i8>) -> Result<Self, Self::Error> {
        if values.len() != BOARD_CELLS {
            return Err(GridError::WrongSize(values.len()));
        }

        let mut grid = ObservationGrid::new();
        for (slot, value) in grid.marks.iter_mut().zip(values) {
            *slot = Mark::try_from(value)?;
        }

        let hits = grid.hit_count();
        if hits > FLEET_SIZE {
            return Err(GridError::TooManyHits(hits));
        }
        Ok(grid)
    }
}

impl From<ObservationGrid> for Vec<i8> {
    fn from(grid: ObservationGrid) -> Self {
        grid.values()
    }
}
