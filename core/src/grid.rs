//! Board state and the move algorithm.
//!
//! The board is a square of [`Cell`]s stored in row-major order. A move runs
//! two passes over every line: a merge pass that combines equal neighbours in
//! scan order, then a shift pass that compacts tiles toward the near edge.
//! Only Left and Right are implemented directly; Up and Down transpose the
//! board, slide rows, transpose back and relabel the direction tags.

use std::fmt;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::{Direction, GameError, Phase, Tile};

/// Smallest playable side length.
pub const MIN_LENGTH: usize = 2;

const INITIAL_TILES: usize = 2;

/// One grid position with its per-turn animation annotation.
///
/// `source1` and `source2` are offsets along the axis of `direction`: the
/// column for horizontal moves, the row for vertical ones. `source2` is only
/// meaningful for a [`Phase::Merging`] cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cell {
    pub value: Tile,
    pub phase: Phase,
    pub direction: Option<Direction>,
    pub source1: usize,
    pub source2: usize,
}

impl Cell {
    pub const EMPTY: Cell = Cell {
        value: Tile::Empty,
        phase: Phase::Default,
        direction: None,
        source1: 0,
        source2: 0,
    };

    /// A settled cell holding `value`.
    pub fn new(value: Tile) -> Cell {
        Cell { value, ..Cell::EMPTY }
    }
}

/// What a single move did to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveSummary {
    /// Number of pairs combined into one tile.
    pub merges: usize,
    /// Whether any merge produced [`Tile::MAX`].
    pub reached_max: bool,
}

impl MoveSummary {
    fn absorb(&mut self, other: MoveSummary) {
        self.merges += other.merges;
        self.reached_max |= other.reached_max;
    }
}

/// Square grid of cells, row-major.
///
/// This is also the immutable snapshot handed to the animation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    length: usize,
    cells: Vec<Cell>,
}

impl Board {
    /// An empty board of side `length`.
    pub fn new(length: usize) -> Board {
        Board {
            length,
            cells: vec![Cell::EMPTY; length * length],
        }
    }

    /// A settled board holding `tiles` in row-major order.
    ///
    /// Returns None unless exactly `length * length` tiles are given.
    pub fn from_tiles(length: usize, tiles: &[Tile]) -> Option<Board> {
        if tiles.len() != length * length {
            return None;
        }
        Some(Board {
            length,
            cells: tiles.iter().map(|&t| Cell::new(t)).collect(),
        })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        &self.cells[row * self.length + column]
    }

    pub(crate) fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Iterate over the rows, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.length)
    }

    pub fn empty_count(&self) -> usize {
        self.cells.iter().filter(|c| c.value.is_empty()).count()
    }

    /// Whether the last move moved or merged anything.
    pub fn has_something_changed(&self) -> bool {
        self.cells.iter().any(|c| c.phase != Phase::Default)
    }

    /// Drop every per-turn annotation, keeping the values.
    pub fn reset_states(&mut self) {
        for cell in &mut self.cells {
            cell.phase = Phase::Default;
            cell.direction = None;
            cell.source1 = 0;
            cell.source2 = 0;
        }
    }

    /// Slide every line toward `direction`.
    pub fn apply(&mut self, direction: Direction) -> Result<MoveSummary, GameError> {
        match direction {
            Direction::Left | Direction::Right => self.slide_rows(direction),
            Direction::Up => self.slide_columns(Direction::Left),
            Direction::Down => self.slide_columns(Direction::Right),
        }
    }

    fn slide_rows(&mut self, direction: Direction) -> Result<MoveSummary, GameError> {
        let mut summary = MoveSummary::default();
        for row in self.cells.chunks_mut(self.length) {
            summary.absorb(merge_line(row, direction)?);
            shift_line(row, direction);
        }
        Ok(summary)
    }

    fn slide_columns(&mut self, row_direction: Direction) -> Result<MoveSummary, GameError> {
        self.transpose();
        let summary = self.slide_rows(row_direction);
        self.transpose();
        self.relabel_vertical();
        summary
    }

    /// Mirror the board across its main diagonal.
    fn transpose(&mut self) {
        let n = self.length;
        for i in 0..n {
            for j in (i + 1)..n {
                self.cells.swap(i * n + j, j * n + i);
            }
        }
    }

    /// Turn Left/Right tags written on a transposed board into Up/Down.
    fn relabel_vertical(&mut self) {
        for cell in &mut self.cells {
            cell.direction = match cell.direction {
                Some(Direction::Left) => Some(Direction::Up),
                Some(Direction::Right) => Some(Direction::Down),
                other => other,
            };
        }
    }
}

/// Index of the `k`-th cell in scan order: near edge first.
fn scan_index(len: usize, direction: Direction, k: usize) -> usize {
    match direction {
        Direction::Left | Direction::Up => k,
        Direction::Right | Direction::Down => len - 1 - k,
    }
}

/// Merge equal neighbours of one line, scanning from the edge `direction`
/// points at. A merged tile never merges again in the same move.
fn merge_line(line: &mut [Cell], direction: Direction) -> Result<MoveSummary, GameError> {
    let len = line.len();
    let mut summary = MoveSummary::default();
    let mut target = 0;
    let mut k = 1;
    while k < len {
        let from = scan_index(len, direction, k);
        let to = scan_index(len, direction, target);
        if line[from].value.is_empty() {
            k += 1;
            continue;
        }
        if line[to].value.is_empty() || line[to].value != line[from].value {
            target = k;
            k += 1;
            continue;
        }
        let result = line[to].value.next()?;
        if result == Tile::MAX {
            summary.reached_max = true;
        }
        line[to] = Cell {
            value: result,
            phase: Phase::Merging,
            direction: Some(direction),
            source1: to,
            source2: from,
        };
        line[from] = Cell::EMPTY;
        summary.merges += 1;
        target = k + 1;
        k += 2;
    }
    Ok(summary)
}

/// Compact the tiles of one line toward the edge `direction` points at.
///
/// Tiles that travel are tagged Moving with their origin in `source1`;
/// merged tiles keep their Merging annotation.
fn shift_line(line: &mut [Cell], direction: Direction) {
    let len = line.len();
    let mut write = 0;
    for read in 0..len {
        let from = scan_index(len, direction, read);
        if line[from].value.is_empty() {
            continue;
        }
        if write != read {
            let to = scan_index(len, direction, write);
            let mut cell = line[from];
            if cell.phase != Phase::Merging {
                cell = Cell {
                    value: cell.value,
                    phase: Phase::Moving,
                    direction: Some(direction),
                    source1: from,
                    source2: 0,
                };
            }
            line[to] = cell;
            line[from] = Cell::EMPTY;
        }
        write += 1;
    }
}

/// The game board together with its spawn source and terminal flags.
///
/// `free` always equals the number of empty cells; it is maintained
/// incrementally by spawns and merges.
#[derive(Clone)]
pub struct GridEngine<R = SmallRng> {
    board: Board,
    free: usize,
    game_over: bool,
    success: bool,
    rng: R,
}

impl GridEngine<SmallRng> {
    /// Create a game whose spawns are driven by a seeded [`SmallRng`].
    pub fn with_seed(length: usize, seed: u64) -> Result<Self, GameError> {
        Self::new(length, SmallRng::seed_from_u64(seed))
    }
}

impl<R: Rng> GridEngine<R> {
    /// Create an empty board of side `length` and spawn the opening tiles.
    pub fn new(length: usize, rng: R) -> Result<Self, GameError> {
        if length < MIN_LENGTH {
            return Err(GameError::InvalidLength {
                length,
                min: MIN_LENGTH,
            });
        }
        let mut grid = GridEngine {
            board: Board::new(length),
            free: length * length,
            game_over: false,
            success: false,
            rng,
        };
        for _ in 0..INITIAL_TILES {
            grid.new_tile()?;
        }
        Ok(grid)
    }

    /// Resume play on an existing board without spawning anything.
    pub fn from_board(board: Board, rng: R) -> Result<Self, GameError> {
        if board.length < MIN_LENGTH {
            return Err(GameError::InvalidLength {
                length: board.length,
                min: MIN_LENGTH,
            });
        }
        let free = board.empty_count();
        let success = board.cells().iter().any(|c| c.value == Tile::MAX);
        let mut grid = GridEngine {
            board,
            free,
            game_over: success,
            success,
            rng,
        };
        if grid.free == 0 && !grid.has_legal_move()? {
            grid.game_over = true;
            info!("resumed board has no legal moves, game lost");
        }
        Ok(grid)
    }

    /// Place [`Tile::INITIAL`] on a uniformly chosen empty cell.
    ///
    /// A full board ends the game instead. After a spawn that fills the
    /// board, the game also ends if no direction can change anything.
    pub fn new_tile(&mut self) -> Result<(), GameError> {
        if self.free == 0 {
            self.game_over = true;
            info!("board full, game lost");
            return Ok(());
        }
        debug_assert_eq!(self.free, self.board.empty_count());

        let number = self.rng.gen_range(0..self.free);
        let length = self.board.length;
        let Some((index, cell)) = self
            .board
            .cells
            .iter_mut()
            .enumerate()
            .filter(|(_, c)| c.value.is_empty())
            .nth(number)
        else {
            unreachable!("free count out of sync with board");
        };
        *cell = Cell {
            value: Tile::INITIAL,
            phase: Phase::Arising,
            ..Cell::EMPTY
        };
        self.free -= 1;
        debug!(row = index / length, column = index % length, "spawned tile");

        if self.free == 0 && !self.has_legal_move()? {
            self.game_over = true;
            info!("no legal moves remain, game lost");
        }
        Ok(())
    }
}

impl<R> GridEngine<R> {
    /// Slide every tile toward `direction`, merging equal neighbours.
    ///
    /// Producing [`Tile::MAX`] wins the game; the rest of the board is still
    /// processed so the turn animates completely.
    pub fn move_tiles(&mut self, direction: Direction) -> Result<MoveSummary, GameError> {
        let summary = self.board.apply(direction)?;
        self.free += summary.merges;
        if summary.reached_max {
            self.game_over = true;
            self.success = true;
            info!("reached {}, game won", Tile::MAX);
        }
        debug!(?direction, merges = summary.merges, free = self.free, "moved");
        Ok(summary)
    }

    /// Whether the last move moved or merged any tile.
    pub fn has_something_changed(&self) -> bool {
        self.board.has_something_changed()
    }

    /// Clear the per-turn annotations once a turn has finished animating.
    pub fn reset_states(&mut self) {
        self.board.reset_states();
    }

    /// Whether moving toward `direction` would change the board.
    ///
    /// Runs the move on a copy; the board and the spawn source are untouched.
    pub fn can_move(&self, direction: Direction) -> Result<bool, GameError> {
        let mut board = self.board.clone();
        board.reset_states();
        board.apply(direction)?;
        Ok(board.has_something_changed())
    }

    /// The directions that would change the board, in [`Direction::ALL`] order.
    pub fn legal_directions(&self) -> Result<Vec<Direction>, GameError> {
        let mut legal = Vec::with_capacity(4);
        for direction in Direction::ALL {
            if self.can_move(direction)? {
                legal.push(direction);
            }
        }
        Ok(legal)
    }

    pub fn has_legal_move(&self) -> Result<bool, GameError> {
        for direction in Direction::ALL {
            if self.can_move(direction)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn length(&self) -> usize {
        self.board.length
    }

    /// Number of empty cells.
    pub fn free(&self) -> usize {
        self.free
    }

    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        self.board.cell(row, column)
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// An owned copy of the board for the animation layer.
    pub fn snapshot(&self) -> Board {
        self.board.clone()
    }

    /// The largest tile on the board.
    pub fn max_tile(&self) -> Tile {
        self.board
            .cells
            .iter()
            .map(|c| c.value)
            .max()
            .unwrap_or(Tile::Empty)
    }
}

impl<R> fmt::Debug for GridEngine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "GridEngine {{ free: {}, game_over: {}, success: {} }}",
            self.free, self.game_over, self.success
        )?;
        for row in self.board.rows() {
            for cell in row {
                write!(f, "{:>5}", cell.value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl<R> fmt::Display for GridEngine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = format!("+{}", "------+".repeat(self.board.length));
        writeln!(f, "{separator}")?;
        for row in self.board.rows() {
            write!(f, "|")?;
            for cell in row {
                if cell.value.is_empty() {
                    write!(f, "      |")?;
                } else {
                    write!(f, "{:^6}|", cell.value)?;
                }
            }
            writeln!(f)?;
            writeln!(f, "{separator}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(value: u32) -> Tile {
        if value == 0 {
            Tile::Empty
        } else {
            Tile::from_ordinal(value.trailing_zeros() as u8).unwrap()
        }
    }

    fn line(values: &[u32]) -> Vec<Cell> {
        values.iter().map(|&v| Cell::new(tile(v))).collect()
    }

    fn values(cells: &[Cell]) -> Vec<u32> {
        cells.iter().map(|c| c.value.value()).collect()
    }

    /// A settled grid holding `rows`, spawning from a fixed seed.
    fn grid_from(rows: &[&[u32]]) -> GridEngine {
        let tiles: Vec<Tile> = rows.iter().flat_map(|r| r.iter().map(|&v| tile(v))).collect();
        let board = Board::from_tiles(rows.len(), &tiles).unwrap();
        GridEngine::from_board(board, SmallRng::seed_from_u64(7)).unwrap()
    }

    fn slide(values_in: &[u32], direction: Direction) -> Vec<Cell> {
        let mut row = line(values_in);
        merge_line(&mut row, direction).unwrap();
        shift_line(&mut row, direction);
        row
    }

    // -------------------------------------------------------------------------
    // Line algorithm tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_merge_then_shift_left() {
        let row = slide(&[2, 2, 4, 0], Direction::Left);
        assert_eq!(values(&row), [4, 4, 0, 0]);

        assert_eq!(row[0].phase, Phase::Merging);
        assert_eq!(row[0].direction, Some(Direction::Left));
        assert_eq!((row[0].source1, row[0].source2), (0, 1));

        assert_eq!(row[1].phase, Phase::Moving);
        assert_eq!(row[1].direction, Some(Direction::Left));
        assert_eq!(row[1].source1, 2);

        assert_eq!(row[2], Cell::EMPTY);
        assert_eq!(row[3], Cell::EMPTY);
    }

    #[test]
    fn test_merge_then_shift_right() {
        let row = slide(&[2, 2, 4, 0], Direction::Right);
        assert_eq!(values(&row), [0, 0, 4, 4]);

        assert_eq!(row[2].phase, Phase::Merging);
        assert_eq!(row[2].direction, Some(Direction::Right));
        assert_eq!((row[2].source1, row[2].source2), (1, 0));

        assert_eq!(row[3].phase, Phase::Moving);
        assert_eq!(row[3].source1, 2);
    }

    #[test]
    fn test_no_double_merge_chain() {
        // [2, 2, 2, 2] should become [4, 4, 0, 0], not [8, 0, 0, 0]
        let row = slide(&[2, 2, 2, 2], Direction::Left);
        assert_eq!(values(&row), [4, 4, 0, 0]);
        assert_eq!((row[0].source1, row[0].source2), (0, 1));
        // The second merge happened at index 2 and then slid to 1.
        assert_eq!(row[1].phase, Phase::Merging);
        assert_eq!((row[1].source1, row[1].source2), (2, 3));
    }

    #[test]
    fn test_no_double_merge() {
        // [4, 2, 2, 0] should become [4, 4, 0, 0], not [8, 0, 0, 0]
        let row = slide(&[4, 2, 2, 0], Direction::Left);
        assert_eq!(values(&row), [4, 4, 0, 0]);
        assert_eq!(row[0].phase, Phase::Default);
        assert_eq!(row[1].phase, Phase::Merging);
        assert_eq!((row[1].source1, row[1].source2), (1, 2));
    }

    #[test]
    fn test_merge_with_gaps() {
        let row = slide(&[2, 0, 2, 0], Direction::Left);
        assert_eq!(values(&row), [4, 0, 0, 0]);
        assert_eq!((row[0].source1, row[0].source2), (0, 2));
    }

    #[test]
    fn test_merge_prefers_near_edge_pair() {
        let row = slide(&[2, 2, 2, 0], Direction::Right);
        assert_eq!(values(&row), [0, 0, 2, 4]);
        assert_eq!(row[3].phase, Phase::Merging);
        assert_eq!((row[3].source1, row[3].source2), (2, 1));
        assert_eq!(row[2].phase, Phase::Moving);
        assert_eq!(row[2].source1, 0);
    }

    #[test]
    fn test_shift_only() {
        let row = slide(&[0, 2, 0, 4], Direction::Left);
        assert_eq!(values(&row), [2, 4, 0, 0]);
        assert_eq!(row[0].source1, 1);
        assert_eq!(row[1].source1, 3);
        assert!(row[..2].iter().all(|c| c.phase == Phase::Moving));
    }

    #[test]
    fn test_packed_line_unchanged() {
        let row = slide(&[2, 4, 8, 16], Direction::Left);
        assert_eq!(values(&row), [2, 4, 8, 16]);
        assert!(row.iter().all(|c| c.phase == Phase::Default));
    }

    #[test]
    fn test_merge_reports_max() {
        let mut row = line(&[1024, 1024, 2, 2]);
        let summary = merge_line(&mut row, Direction::Left).unwrap();
        assert_eq!(summary.merges, 2);
        assert!(summary.reached_max);
        shift_line(&mut row, Direction::Left);
        assert_eq!(values(&row), [2048, 4, 0, 0]);
    }

    // -------------------------------------------------------------------------
    // Board move tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_move_up_via_transpose() {
        let mut grid = grid_from(&[&[2, 0, 0, 0], &[2, 0, 0, 0], &[4, 0, 0, 0], &[0, 0, 0, 0]]);
        grid.move_tiles(Direction::Up).unwrap();

        assert_eq!(grid.cell(0, 0).value, Tile::T4);
        assert_eq!(grid.cell(0, 0).phase, Phase::Merging);
        assert_eq!(grid.cell(0, 0).direction, Some(Direction::Up));
        assert_eq!((grid.cell(0, 0).source1, grid.cell(0, 0).source2), (0, 1));

        assert_eq!(grid.cell(1, 0).value, Tile::T4);
        assert_eq!(grid.cell(1, 0).phase, Phase::Moving);
        assert_eq!(grid.cell(1, 0).direction, Some(Direction::Up));
        assert_eq!(grid.cell(1, 0).source1, 2);

        assert!(grid.cell(2, 0).value.is_empty());
    }

    #[test]
    fn test_move_down_via_transpose() {
        let mut grid = grid_from(&[&[0, 8, 0, 0], &[0, 0, 0, 0], &[0, 4, 0, 0], &[0, 2, 0, 0]]);
        grid.move_tiles(Direction::Down).unwrap();

        let column: Vec<u32> = (0..4).map(|r| grid.cell(r, 1).value.value()).collect();
        assert_eq!(column, [0, 8, 4, 2]);
        assert_eq!(grid.cell(3, 1).phase, Phase::Default);
        assert_eq!(grid.cell(2, 1).phase, Phase::Default);
        assert_eq!(grid.cell(1, 1).phase, Phase::Moving);
        assert_eq!(grid.cell(1, 1).direction, Some(Direction::Down));
        assert_eq!(grid.cell(1, 1).source1, 0);
    }

    #[test]
    fn test_move_down_merges_across_gap() {
        let mut grid = grid_from(&[&[0, 8, 0, 0], &[0, 0, 0, 0], &[0, 8, 0, 0], &[0, 2, 0, 0]]);
        grid.move_tiles(Direction::Down).unwrap();

        let column: Vec<u32> = (0..4).map(|r| grid.cell(r, 1).value.value()).collect();
        assert_eq!(column, [0, 0, 16, 2]);
        assert_eq!(grid.cell(2, 1).phase, Phase::Merging);
        assert_eq!(grid.cell(2, 1).direction, Some(Direction::Down));
        assert_eq!((grid.cell(2, 1).source1, grid.cell(2, 1).source2), (2, 0));
        assert_eq!(grid.free(), 14);
    }

    #[test]
    fn test_move_matches_row_semantics_on_every_axis() {
        let rows: &[&[u32]] = &[&[2, 2, 0, 0], &[0, 4, 4, 0], &[2, 0, 2, 0], &[8, 8, 8, 8]];
        let mut horizontal = grid_from(rows);
        horizontal.move_tiles(Direction::Left).unwrap();

        let mut vertical = grid_from(rows);
        vertical.board.transpose();
        vertical.move_tiles(Direction::Up).unwrap();
        vertical.board.transpose();

        for r in 0..4 {
            for c in 0..4 {
                let h = horizontal.cell(r, c);
                let v = vertical.cell(r, c);
                assert_eq!(h.value, v.value);
                assert_eq!(h.phase, v.phase);
                assert_eq!((h.source1, h.source2), (v.source1, v.source2));
            }
        }
    }

    #[test]
    fn test_transpose_twice_is_identity() {
        let mut grid = grid_from(&[&[2, 4, 8, 0], &[0, 16, 0, 2], &[4, 0, 0, 0], &[0, 0, 32, 64]]);
        let before = grid.snapshot();
        grid.board.transpose();
        assert_ne!(grid.board, before);
        grid.board.transpose();
        assert_eq!(grid.board, before);
    }

    #[test]
    fn test_vertical_moves_leave_no_horizontal_tags() {
        let mut grid = grid_from(&[&[2, 2, 4, 0], &[2, 4, 4, 2], &[4, 2, 0, 2], &[2, 0, 2, 4]]);
        for direction in [Direction::Up, Direction::Down, Direction::Up, Direction::Down] {
            grid.reset_states();
            grid.move_tiles(direction).unwrap();
            for cell in grid.board.cells() {
                assert!(!matches!(
                    cell.direction,
                    Some(Direction::Left) | Some(Direction::Right)
                ));
            }
        }
    }

    #[test]
    fn test_no_change_spawns_nothing() {
        let mut grid = grid_from(&[&[0, 0, 0, 2], &[0, 0, 0, 0], &[0, 0, 0, 0], &[0, 0, 0, 0]]);
        grid.move_tiles(Direction::Right).unwrap();
        assert!(!grid.has_something_changed());
        assert!(!grid.can_move(Direction::Right).unwrap());
        assert_eq!(grid.free(), 15);
    }

    #[test]
    fn test_win_sets_both_flags() {
        let mut grid = grid_from(&[&[1024, 1024, 0, 0], &[2, 2, 0, 0], &[0, 0, 0, 0], &[0, 0, 0, 0]]);
        let summary = grid.move_tiles(Direction::Left).unwrap();
        assert_eq!(summary.merges, 2);
        assert!(grid.is_game_over());
        assert!(grid.is_success());
        assert_eq!(grid.cell(0, 0).value, Tile::T2048);
        // The rest of the board was still processed.
        assert_eq!(grid.cell(1, 0).value, Tile::T4);
        assert_eq!(grid.max_tile(), Tile::T2048);
    }

    #[test]
    fn test_reset_states_clears_annotations() {
        let mut grid = grid_from(&[&[2, 2, 4, 0], &[0, 0, 0, 0], &[0, 0, 0, 0], &[0, 0, 0, 0]]);
        grid.move_tiles(Direction::Left).unwrap();
        assert!(grid.has_something_changed());
        grid.reset_states();
        assert!(!grid.has_something_changed());
        for cell in grid.board.cells() {
            assert_eq!(cell.direction, None);
            assert_eq!((cell.source1, cell.source2), (0, 0));
        }
        assert_eq!(grid.cell(0, 0).value, Tile::T4);
    }

    #[test]
    fn test_free_tracks_empty_cells_and_tiles_never_grow() {
        let mut grid = GridEngine::with_seed(4, 2024).unwrap();
        let order = [Direction::Left, Direction::Down, Direction::Right, Direction::Up];
        for step in 0..400 {
            if grid.is_game_over() {
                break;
            }
            grid.reset_states();
            let tiles_before = 16 - grid.free();
            grid.move_tiles(order[step % 4]).unwrap();
            assert_eq!(grid.free(), grid.board.empty_count());
            assert!(16 - grid.free() <= tiles_before);
            if grid.has_something_changed() {
                grid.new_tile().unwrap();
            }
            assert_eq!(grid.free(), grid.board.empty_count());
        }
    }

    // -------------------------------------------------------------------------
    // Spawn tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_new_game_has_two_arising_tiles() {
        let grid = GridEngine::with_seed(4, 42).unwrap();
        assert_eq!(grid.free(), 14);
        let spawned: Vec<&Cell> = grid.board.cells().iter().filter(|c| !c.value.is_empty()).collect();
        assert_eq!(spawned.len(), 2);
        for cell in spawned {
            assert_eq!(cell.value, Tile::INITIAL);
            assert_eq!(cell.phase, Phase::Arising);
            assert_eq!(cell.direction, None);
        }
        assert!(!grid.is_game_over());
    }

    #[test]
    fn test_spawn_determinism() {
        let grid1 = GridEngine::with_seed(4, 12345).unwrap();
        let grid2 = GridEngine::with_seed(4, 12345).unwrap();
        assert_eq!(grid1.board(), grid2.board());
    }

    #[test]
    fn test_from_tiles_checks_size() {
        assert!(Board::from_tiles(2, &[Tile::T2; 3]).is_none());
        let board = Board::from_tiles(2, &[Tile::T2, Tile::Empty, Tile::Empty, Tile::T4]).unwrap();
        assert_eq!(board.empty_count(), 2);
        assert_eq!(board.cell(1, 1).value, Tile::T4);
    }

    #[test]
    fn test_from_board_keeps_board_and_counts_free() {
        let grid = grid_from(&[&[2, 0, 0], &[0, 4, 0], &[0, 0, 0]]);
        assert_eq!(grid.free(), 7);
        assert_eq!(grid.length(), 3);
        assert!(!grid.is_game_over());
        assert!(!grid.has_something_changed());
    }

    #[test]
    fn test_from_board_detects_stuck_board() {
        let grid = grid_from(&[&[2, 4], &[4, 2]]);
        assert_eq!(grid.free(), 0);
        assert!(grid.is_game_over());
        assert!(!grid.is_success());

        // Full but mergeable boards stay in play.
        let grid = grid_from(&[&[2, 2], &[4, 8]]);
        assert!(!grid.is_game_over());
    }

    #[test]
    fn test_invalid_length() {
        let err = GridEngine::with_seed(1, 0).unwrap_err();
        assert!(matches!(err, GameError::InvalidLength { length: 1, min: 2 }));
    }

    #[test]
    fn test_spawn_fills_last_empty_cell() {
        let mut grid = grid_from(&[&[2, 4, 2, 4], &[4, 2, 4, 2], &[2, 4, 2, 4], &[4, 2, 2, 0]]);
        grid.new_tile().unwrap();
        assert_eq!(grid.free(), 0);
        assert_eq!(grid.cell(3, 3).value, Tile::T2);
        assert_eq!(grid.cell(3, 3).phase, Phase::Arising);
        // The new 2 can merge with its left neighbour.
        assert!(!grid.is_game_over());
    }

    #[test]
    fn test_stuck_board_detected_on_spawn() {
        let mut grid = grid_from(&[&[2, 4, 2, 4], &[4, 2, 4, 2], &[2, 4, 2, 4], &[4, 2, 4, 0]]);
        grid.new_tile().unwrap();
        assert!(grid.is_game_over());
        assert!(!grid.is_success());
        assert!(grid.legal_directions().unwrap().is_empty());
    }

    #[test]
    fn test_spawn_on_full_board_ends_game() {
        let mut grid = grid_from(&[&[2, 2], &[4, 8]]);
        assert_eq!(grid.free(), 0);
        let before = grid.snapshot();
        grid.new_tile().unwrap();
        assert!(grid.is_game_over());
        assert!(!grid.is_success());
        assert_eq!(grid.board, before);
    }

    // -------------------------------------------------------------------------
    // Legal move tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_legal_directions() {
        let grid = grid_from(&[&[2, 0, 0, 0], &[0, 0, 0, 0], &[0, 0, 0, 0], &[0, 0, 0, 0]]);
        assert_eq!(
            grid.legal_directions().unwrap(),
            vec![Direction::Down, Direction::Right]
        );
        // Probing leaves the board untouched.
        assert!(!grid.has_something_changed());
    }

    // -------------------------------------------------------------------------
    // Display tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_display_format() {
        let grid = grid_from(&[&[2, 0], &[0, 128]]);
        let display = format!("{}", grid);
        assert!(display.starts_with("+------+------+"));
        assert!(display.contains("  2   |"));
        assert!(display.contains(" 128  |"));
    }

    #[test]
    fn test_debug_format() {
        let grid = GridEngine::with_seed(4, 42).unwrap();
        let debug = format!("{:?}", grid);
        assert!(debug.contains("GridEngine"));
        assert!(debug.contains("free: 14"));
    }
}
