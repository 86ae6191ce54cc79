//! # Animated 2048 Core Engine
//!
//! Grid logic and animation state machine for a 2048 game whose moves are
//! rendered as timed transitions. Three layers build on each other:
//!
//! - [`grid`]: the board, the merge/shift algorithm and tile spawning.
//! - [`animation`]: interpolated tile positions and opacities for one turn.
//! - [`turn`]: the per-frame state machine driving both against a
//!   [`turn::DisplayService`].
//!
//! ## Example
//!
//! ```rust
//! use slide_2048_core::{Direction, GridEngine};
//!
//! let mut grid = GridEngine::with_seed(4, 42).unwrap();
//! grid.reset_states();
//! grid.move_tiles(Direction::Left).unwrap();
//! if grid.has_something_changed() {
//!     grid.new_tile().unwrap();
//! }
//! println!("{grid}");
//! ```

use std::fmt;

pub mod animation;
pub mod grid;
pub mod turn;

pub use animation::{AnimatedTile, AnimationEngine};
pub use grid::{Board, Cell, GridEngine, MoveSummary};
pub use turn::{DisplayService, TurnController, TurnState};

/// Errors raised by the engine.
///
/// Ladder errors indicate a logic bug: normal play ends the game as soon as
/// [`Tile::MAX`] appears, so no merge ever asks for the tile beyond it.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("next tile for {0} is undefined")]
    NoNextTile(Tile),
    #[error("previous tile for {0} is undefined")]
    NoPreviousTile(Tile),
    #[error("grid side length must be at least {min}, got {length}")]
    InvalidLength { length: usize, min: usize },
    #[error("display failure: {0}")]
    Display(#[from] std::io::Error),
}

/// A tile value on the ladder from empty up to 2048.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Tile {
    #[default]
    Empty = 0,
    T2 = 1,
    T4 = 2,
    T8 = 3,
    T16 = 4,
    T32 = 5,
    T64 = 6,
    T128 = 7,
    T256 = 8,
    T512 = 9,
    T1024 = 10,
    T2048 = 11,
}

impl Tile {
    /// The winning tile.
    pub const MAX: Tile = Tile::T2048;
    /// The tile placed by every spawn.
    pub const INITIAL: Tile = Tile::T2;

    const LADDER: [Tile; 12] = [
        Tile::Empty,
        Tile::T2,
        Tile::T4,
        Tile::T8,
        Tile::T16,
        Tile::T32,
        Tile::T64,
        Tile::T128,
        Tile::T256,
        Tile::T512,
        Tile::T1024,
        Tile::T2048,
    ];

    /// Position on the ladder (0 for empty, 1 for 2, ..., 11 for 2048).
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Look a tile up by its ladder position.
    pub fn from_ordinal(ordinal: u8) -> Option<Tile> {
        Self::LADDER.get(ordinal as usize).copied()
    }

    /// The number printed on the tile, 0 for an empty cell.
    pub fn value(self) -> u32 {
        match self {
            Tile::Empty => 0,
            tile => 1 << tile.ordinal(),
        }
    }

    pub fn is_empty(self) -> bool {
        self == Tile::Empty
    }

    /// The result of merging two tiles of this value.
    pub fn next(self) -> Result<Tile, GameError> {
        match self {
            Tile::Empty => Ok(Tile::Empty),
            Tile::MAX => Err(GameError::NoNextTile(self)),
            tile => Ok(Self::LADDER[tile.ordinal() as usize + 1]),
        }
    }

    /// The value each of the two source tiles had before merging into this one.
    pub fn previous(self) -> Result<Tile, GameError> {
        match self {
            Tile::Empty => Ok(Tile::Empty),
            Tile::T2 => Err(GameError::NoPreviousTile(self)),
            tile => Ok(Self::LADDER[tile.ordinal() as usize - 1]),
        }
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tile::Empty => f.pad("."),
            tile => f.pad(&tile.value().to_string()),
        }
    }
}

/// The four slide directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Whether tiles sliding this way travel along a column.
    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }
}

/// Transient per-turn role of a cell or animated tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    Default,
    Moving,
    Merging,
    Arising,
    Dying,
}

// =============================================================================
// Tests
// =============================================================================
