//! Interpolated tile states for one turn.
//!
//! An [`AnimationEngine`] is rebuilt from a [`Board`] snapshot after every
//! move and discarded once the turn settles. Movement and fading run as two
//! separately timed phases: tiles first slide to their destinations, then
//! [`AnimationEngine::merge`] swaps each merged pair for an arising result
//! tile and a dying partner whose opacities cross-fade.

use std::time::Duration;

use tracing::trace;

use crate::grid::{Board, Cell};
use crate::{Direction, GameError, Phase, Tile};

/// Sliding speed in cells per second, per cell of distance to travel.
/// Every slide therefore takes the same time regardless of its length.
pub const MOVING_RATE: f64 = 2.0;

/// Opacity change per second for arising and dying tiles.
pub const ARISING_RATE: f64 = 2.0;

/// One drawable tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimatedTile {
    pub value: Tile,
    pub phase: Phase,
    pub dst_row: usize,
    pub dst_column: usize,
    /// Position along the axis of `direction`.
    pub current: f64,
    /// Signed, in cells per second.
    pub speed: f64,
    pub opacity: f64,
    pub direction: Option<Direction>,
}

impl AnimatedTile {
    fn is_sliding(&self) -> bool {
        matches!(self.phase, Phase::Moving | Phase::Merging)
    }

    fn is_vertical(&self) -> bool {
        self.direction.is_some_and(Direction::is_vertical)
    }

    fn destination(&self) -> f64 {
        if self.is_vertical() {
            self.dst_row as f64
        } else {
            self.dst_column as f64
        }
    }

    /// Fractional `(row, column)` to draw the tile at.
    pub fn position(&self) -> (f64, f64) {
        if !self.is_sliding() {
            (self.dst_row as f64, self.dst_column as f64)
        } else if self.is_vertical() {
            (self.current, self.dst_column as f64)
        } else {
            (self.dst_row as f64, self.current)
        }
    }

    fn advance(&mut self, seconds: f64) {
        self.current += self.speed * seconds;
        let (row, column) = (self.dst_row as f64, self.dst_column as f64);
        match self.direction {
            Some(Direction::Left) if self.current < column => self.current = column,
            Some(Direction::Right) if self.current > column => self.current = column,
            Some(Direction::Up) if self.current < row => self.current = row,
            Some(Direction::Down) if self.current > row => self.current = row,
            _ => {}
        }
    }
}

/// Slide speed toward `(row, column)` from `source` along the cell's axis.
fn speed(cell: &Cell, row: usize, column: usize, source: usize) -> f64 {
    if !matches!(cell.phase, Phase::Moving | Phase::Merging) {
        return 0.0;
    }
    let destination = match cell.direction {
        Some(direction) if direction.is_vertical() => row,
        _ => column,
    };
    (destination as f64 - source as f64) * MOVING_RATE
}

/// The drawable tiles of one turn.
#[derive(Debug, Clone, Default)]
pub struct AnimationEngine {
    tiles: Vec<AnimatedTile>,
}

impl AnimationEngine {
    /// Build the tile list for the turn `board` describes.
    ///
    /// A merging cell yields two tiles, each showing the pre-merge value:
    /// the one from `source1` first, then its partner from `source2`.
    pub fn from_board(board: &Board) -> Result<Self, GameError> {
        let mut tiles = Vec::new();
        for (row, cells) in board.rows().enumerate() {
            for (column, cell) in cells.iter().enumerate() {
                if cell.value.is_empty() {
                    continue;
                }
                let value = if cell.phase == Phase::Merging {
                    cell.value.previous()?
                } else {
                    cell.value
                };
                let tile = AnimatedTile {
                    value,
                    phase: cell.phase,
                    dst_row: row,
                    dst_column: column,
                    current: cell.source1 as f64,
                    speed: speed(cell, row, column, cell.source1),
                    opacity: if cell.phase == Phase::Arising { 0.0 } else { 1.0 },
                    direction: cell.direction,
                };
                tiles.push(tile);

                if cell.phase == Phase::Merging {
                    tiles.push(AnimatedTile {
                        current: cell.source2 as f64,
                        speed: speed(cell, row, column, cell.source2),
                        ..tile
                    });
                }
            }
        }
        Ok(AnimationEngine { tiles })
    }

    pub fn tiles(&self) -> &[AnimatedTile] {
        &self.tiles
    }

    /// Move sliding tiles forward by `dt`, stopping each at its destination.
    pub fn advance_moving(&mut self, dt: Duration) {
        let seconds = dt.as_secs_f64();
        for tile in self.tiles.iter_mut().filter(|t| t.is_sliding()) {
            tile.advance(seconds);
        }
    }

    pub fn is_moving_done(&self) -> bool {
        self.tiles
            .iter()
            .filter(|t| t.is_sliding())
            .all(|t| t.current == t.destination())
    }

    /// Resolve every merged pair: the first tile becomes the arising result,
    /// the partner right after it starts dying.
    pub fn merge(&mut self) -> Result<(), GameError> {
        for i in 0..self.tiles.len() {
            if self.tiles[i].phase != Phase::Merging {
                continue;
            }
            let tile = &mut self.tiles[i];
            tile.phase = Phase::Arising;
            tile.value = tile.value.next()?;
            tile.opacity = 0.0;
            trace!(row = tile.dst_row, column = tile.dst_column, value = %tile.value, "merged");
            if let Some(partner) = self.tiles.get_mut(i + 1) {
                partner.phase = Phase::Dying;
            }
        }
        Ok(())
    }

    /// Fade arising tiles in and dying tiles out by `dt`.
    pub fn advance_arising(&mut self, dt: Duration) {
        let step = dt.as_secs_f64() * ARISING_RATE;
        for tile in &mut self.tiles {
            match tile.phase {
                Phase::Arising => tile.opacity = (tile.opacity + step).min(1.0),
                Phase::Dying => tile.opacity = (tile.opacity - step).max(0.0),
                _ => {}
            }
        }
    }

    pub fn is_arising_done(&self) -> bool {
        self.tiles.iter().all(|t| match t.phase {
            Phase::Arising => t.opacity == 1.0,
            Phase::Dying => t.opacity == 0.0,
            _ => true,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
