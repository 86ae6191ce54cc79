//! Per-frame state machine tying the grid and its animation to a display.

use std::io;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::Rng;
use tracing::{debug, info, trace};

use crate::animation::AnimationEngine;
use crate::grid::GridEngine;
use crate::{Direction, GameError, Tile};

/// Directions are polled in this order; the first one held wins.
const POLL_ORDER: [Direction; 4] = [
    Direction::Left,
    Direction::Right,
    Direction::Up,
    Direction::Down,
];

/// The window, input and clock the game runs against.
pub trait DisplayService {
    fn is_direction_pressed(&self, direction: Direction) -> bool;

    /// Draw `tile` at fractional grid coordinates, alpha-blended by `opacity`.
    fn draw_tile(&mut self, row: f64, column: f64, tile: Tile, opacity: f64);

    fn draw_win_banner(&mut self);

    fn draw_fail_banner(&mut self) {}

    fn is_closed(&self) -> bool;

    /// Pump pending input. Called once at the start of every frame.
    fn process_events(&mut self) -> io::Result<()>;

    /// Show the frame drawn since the last call and wait for the next one.
    fn present(&mut self) -> io::Result<()>;

    /// Monotonic milliseconds.
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitInput,
    Moving,
    Arising,
    Success,
    Fail,
}

impl TurnState {
    /// Whether gameplay has ended; frames are still drawn.
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::Success | TurnState::Fail)
    }
}

/// Drives one game: reads input, mutates the grid and animates the result.
pub struct TurnController<R = SmallRng> {
    grid: GridEngine<R>,
    animation: AnimationEngine,
    state: TurnState,
    last_tick: Option<u64>,
}

impl<R: Rng> TurnController<R> {
    /// Start a game on `grid`, fading its opening tiles in before the first
    /// input is accepted.
    pub fn new(grid: GridEngine<R>) -> Result<Self, GameError> {
        let animation = AnimationEngine::from_board(grid.board())?;
        Ok(TurnController {
            grid,
            animation,
            state: TurnState::Arising,
            last_tick: None,
        })
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn grid(&self) -> &GridEngine<R> {
        &self.grid
    }

    pub fn animation(&self) -> &AnimationEngine {
        &self.animation
    }

    /// Run frames until the display is closed.
    pub fn run<D: DisplayService>(&mut self, display: &mut D) -> Result<(), GameError> {
        self.draw(display);
        display.present()?;
        while !display.is_closed() {
            display.process_events()?;
            self.frame(display)?;
            display.present()?;
        }
        debug!(state = ?self.state, "display closed");
        Ok(())
    }

    /// Update the state machine by the time elapsed since the previous frame
    /// and draw every animated tile.
    pub fn frame<D: DisplayService>(&mut self, display: &mut D) -> Result<(), GameError> {
        let now = display.now_ms();
        let elapsed = now.saturating_sub(self.last_tick.unwrap_or(now));
        self.last_tick = Some(now);
        self.update(display, Duration::from_millis(elapsed))?;
        self.draw(display);
        Ok(())
    }

    fn update<D: DisplayService>(&mut self, display: &D, dt: Duration) -> Result<(), GameError> {
        match self.state {
            TurnState::AwaitInput => self.turn(display),
            TurnState::Moving => {
                self.animation.advance_moving(dt);
                if self.animation.is_moving_done() {
                    self.animation.merge()?;
                    self.enter(TurnState::Arising);
                }
                Ok(())
            }
            TurnState::Arising => {
                self.animation.advance_arising(dt);
                if self.animation.is_arising_done() {
                    self.settle();
                }
                Ok(())
            }
            TurnState::Success | TurnState::Fail => Ok(()),
        }
    }

    fn turn<D: DisplayService>(&mut self, display: &D) -> Result<(), GameError> {
        let Some(direction) = POLL_ORDER
            .into_iter()
            .find(|&d| display.is_direction_pressed(d))
        else {
            return Ok(());
        };
        self.grid.move_tiles(direction)?;
        if self.grid.has_something_changed() {
            self.grid.new_tile()?;
        }
        self.animation = AnimationEngine::from_board(&self.grid.snapshot())?;
        self.enter(TurnState::Moving);
        Ok(())
    }

    /// The turn's animation has finished: end the game or wait for input.
    fn settle(&mut self) {
        if self.grid.is_game_over() {
            let outcome = if self.grid.is_success() {
                TurnState::Success
            } else {
                TurnState::Fail
            };
            info!(?outcome, max_tile = %self.grid.max_tile(), "game over");
            self.enter(outcome);
        } else {
            self.grid.reset_states();
            self.enter(TurnState::AwaitInput);
        }
    }

    fn enter(&mut self, state: TurnState) {
        trace!(from = ?self.state, to = ?state, "turn state");
        self.state = state;
    }

    fn draw<D: DisplayService>(&self, display: &mut D) {
        for tile in self.animation.tiles() {
            if tile.value.is_empty() {
                continue;
            }
            let (row, column) = tile.position();
            display.draw_tile(row, column, tile.value, tile.opacity);
        }
        match self.state {
            TurnState::Success => display.draw_win_banner(),
            TurnState::Fail => display.draw_fail_banner(),
            _ => {}
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
