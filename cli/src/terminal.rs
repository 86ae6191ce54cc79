//! Terminal implementation of the display service.
//!
//! Input comes from stdin in non-blocking raw mode; frames are composed on a
//! character canvas and written with ANSI truecolor escapes. Each grid cell
//! is a 7x3 character block on an 8x4 pitch, so fractional positions round
//! to the nearest character and slides stay visible.

use std::fmt::Write as _;
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use slide_2048_core::{Direction, DisplayService, Tile};

const CELL_WIDTH: usize = 8;
const CELL_HEIGHT: usize = 4;
const TILE_WIDTH: usize = 7;
const TILE_HEIGHT: usize = 3;

const WIN_BANNER: &str = "You reached 2048!  Press q to quit.";
const FAIL_BANNER: &str = "No moves left.  Press q to quit.";
const CONTROLS: &str = "Arrows/WASD move | q quits";

type Rgb = (u8, u8, u8);

const BOARD_BG: Rgb = (187, 173, 160);
const SLOT_BG: Rgb = (205, 193, 180);
const DARK_TEXT: Rgb = (119, 110, 101);
const LIGHT_TEXT: Rgb = (249, 246, 242);

/// Background and text colour of a tile.
fn tile_colors(tile: Tile) -> (Rgb, Rgb) {
    match tile {
        Tile::Empty => (SLOT_BG, SLOT_BG),
        Tile::T2 => ((238, 228, 218), DARK_TEXT),
        Tile::T4 => ((237, 224, 200), DARK_TEXT),
        Tile::T8 => ((242, 177, 121), LIGHT_TEXT),
        Tile::T16 => ((245, 149, 99), LIGHT_TEXT),
        Tile::T32 => ((246, 124, 95), LIGHT_TEXT),
        Tile::T64 => ((246, 94, 59), LIGHT_TEXT),
        Tile::T128 => ((237, 207, 114), LIGHT_TEXT),
        Tile::T256 => ((237, 204, 97), LIGHT_TEXT),
        Tile::T512 => ((237, 200, 80), LIGHT_TEXT),
        Tile::T1024 => ((237, 197, 63), LIGHT_TEXT),
        Tile::T2048 => ((237, 194, 46), LIGHT_TEXT),
    }
}

/// Alpha-blend `over` onto `under`.
fn blend(under: Rgb, over: Rgb, alpha: f64) -> Rgb {
    let alpha = alpha.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * alpha).round() as u8;
    (mix(under.0, over.0), mix(under.1, over.1), mix(under.2, over.2))
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pixel {
    ch: char,
    fg: Rgb,
    bg: Rgb,
}

/// Character frame buffer for one board.
struct Canvas {
    length: usize,
    width: usize,
    height: usize,
    pixels: Vec<Pixel>,
}

impl Canvas {
    fn new(length: usize) -> Canvas {
        let width = length * CELL_WIDTH + 1;
        let height = length * CELL_HEIGHT + 1;
        let mut canvas = Canvas {
            length,
            width,
            height,
            pixels: Vec::with_capacity(width * height),
        };
        canvas.clear();
        canvas
    }

    /// Paint the empty board: background plus one slot per cell.
    fn clear(&mut self) {
        let blank = Pixel {
            ch: ' ',
            fg: BOARD_BG,
            bg: BOARD_BG,
        };
        self.pixels.clear();
        self.pixels.resize(self.width * self.height, blank);
        for row in 0..self.length {
            for column in 0..self.length {
                self.fill(
                    (1 + row * CELL_HEIGHT) as isize,
                    (1 + column * CELL_WIDTH) as isize,
                    SLOT_BG,
                );
            }
        }
    }

    fn pixel_mut(&mut self, y: isize, x: isize) -> Option<&mut Pixel> {
        if y < 0 || x < 0 || y as usize >= self.height || x as usize >= self.width {
            return None;
        }
        self.pixels.get_mut(y as usize * self.width + x as usize)
    }

    fn fill(&mut self, y0: isize, x0: isize, bg: Rgb) {
        for dy in 0..TILE_HEIGHT as isize {
            for dx in 0..TILE_WIDTH as isize {
                if let Some(pixel) = self.pixel_mut(y0 + dy, x0 + dx) {
                    *pixel = Pixel { ch: ' ', fg: bg, bg };
                }
            }
        }
    }

    /// Blend a tile over whatever is drawn at fractional `(row, column)`.
    ///
    /// Below half opacity the tile only tints what lies beneath; from half
    /// opacity on its label replaces the characters underneath.
    fn draw_tile(&mut self, row: f64, column: f64, tile: Tile, opacity: f64) {
        if opacity <= 0.0 || tile.is_empty() {
            return;
        }
        let (tile_bg, tile_fg) = tile_colors(tile);
        let y0 = 1 + (row * CELL_HEIGHT as f64).round() as isize;
        let x0 = 1 + (column * CELL_WIDTH as f64).round() as isize;
        let label: Vec<char> = tile.value().to_string().chars().collect();
        let label_start = (TILE_WIDTH - label.len()) / 2;
        let opaque = opacity >= 0.5;

        for dy in 0..TILE_HEIGHT {
            for dx in 0..TILE_WIDTH {
                let Some(pixel) = self.pixel_mut(y0 + dy as isize, x0 + dx as isize) else {
                    continue;
                };
                let bg = blend(pixel.bg, tile_bg, opacity);
                pixel.bg = bg;
                if opaque {
                    let ch = if dy == TILE_HEIGHT / 2 && dx >= label_start {
                        label.get(dx - label_start).copied().unwrap_or(' ')
                    } else {
                        ' '
                    };
                    pixel.ch = ch;
                    pixel.fg = blend(bg, tile_fg, opacity);
                } else {
                    pixel.fg = blend(pixel.fg, tile_bg, opacity);
                }
            }
        }
    }

    /// Append the frame as ANSI text, one line per canvas row.
    fn render(&self, out: &mut String) {
        for line in self.pixels.chunks(self.width) {
            out.push(' ');
            let mut last: Option<(Rgb, Rgb)> = None;
            for pixel in line {
                if last != Some((pixel.fg, pixel.bg)) {
                    let (f, b) = (pixel.fg, pixel.bg);
                    let _ = write!(
                        out,
                        "\x1b[38;2;{};{};{}m\x1b[48;2;{};{};{}m",
                        f.0, f.1, f.2, b.0, b.1, b.2
                    );
                    last = Some((f, b));
                }
                out.push(pixel.ch);
            }
            out.push_str("\x1b[0m\x1b[K\r\n");
        }
    }
}

/// A decoded keypress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Move(Direction),
    Quit,
}

/// What the bytes at the front of the input stream decode to.
enum Token {
    /// A keypress spanning this many bytes; `None` for keys the game ignores.
    Key(Option<Input>, usize),
    /// An escape sequence cut off by the end of the read.
    Incomplete,
}

fn next_token(bytes: &[u8]) -> Token {
    let key = |input, len| Token::Key(Some(input), len);
    match bytes {
        [27, 91, rest @ ..] => control_sequence(rest),
        // SS3: F1-F4 and keypad keys
        [27, b'O', _, ..] => Token::Key(None, 3),
        [27] | [27, b'O'] => Token::Incomplete,
        [27, 27, ..] => key(Input::Quit, 1),
        // Alt+key
        [27, _, ..] => Token::Key(None, 2),

        // WASD keys
        [b'w' | b'W', ..] => key(Input::Move(Direction::Up), 1),
        [b's' | b'S', ..] => key(Input::Move(Direction::Down), 1),
        [b'a' | b'A', ..] => key(Input::Move(Direction::Left), 1),
        [b'd' | b'D', ..] => key(Input::Move(Direction::Right), 1),

        // q, Q, Ctrl+C
        [b'q' | b'Q' | 3, ..] => key(Input::Quit, 1),

        _ => Token::Key(None, 1),
    }
}

/// Decode the rest of an `ESC [` sequence: parameter bytes, then one final
/// byte. Only the bare arrow keys mean anything.
fn control_sequence(rest: &[u8]) -> Token {
    let Some(last) = rest.iter().position(|b| !(0x20..=0x3f).contains(b)) else {
        return Token::Incomplete;
    };
    let input = match &rest[..=last] {
        [b'A'] => Some(Input::Move(Direction::Up)),
        [b'B'] => Some(Input::Move(Direction::Down)),
        [b'C'] => Some(Input::Move(Direction::Right)),
        [b'D'] => Some(Input::Move(Direction::Left)),
        _ => None,
    };
    Token::Key(input, 2 + last + 1)
}

/// Turns raw stdin reads into keypresses.
///
/// Non-blocking reads can split an escape sequence across frames, so an
/// unfinished one is held back until more bytes arrive. When a read brings
/// nothing new, a held-back lone Esc counts as a keypress and any other
/// fragment is dropped.
#[derive(Debug, Default)]
struct KeyDecoder {
    pending: Vec<u8>,
}

impl KeyDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Vec<Input> {
        let idle = bytes.is_empty();
        self.pending.extend_from_slice(bytes);
        let mut inputs = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            match next_token(&self.pending[i..]) {
                Token::Key(input, len) => {
                    inputs.extend(input);
                    i += len;
                }
                Token::Incomplete if idle => {
                    if self.pending[i..] == [27] {
                        inputs.push(Input::Quit);
                    }
                    i = self.pending.len();
                }
                Token::Incomplete => break,
            }
        }
        self.pending.drain(..i);
        inputs
    }
}

/// Terminal switched to unbuffered, non-echoing, non-blocking input.
#[cfg(unix)]
struct RawMode {
    original: libc::termios,
}

#[cfg(unix)]
impl RawMode {
    fn enable() -> io::Result<RawMode> {
        use std::os::unix::io::AsRawFd;
        let fd = io::stdin().as_raw_fd();
        // SAFETY: termios is plain data and is fully written by tcgetattr
        // before it is read.
        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &mut termios) != 0 {
                return Err(io::Error::last_os_error());
            }
            let original = termios;
            termios.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ISIG);
            termios.c_cc[libc::VMIN] = 0;
            termios.c_cc[libc::VTIME] = 0;
            if libc::tcsetattr(fd, libc::TCSANOW, &termios) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(RawMode { original })
        }
    }
}

#[cfg(unix)]
impl Drop for RawMode {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        let fd = io::stdin().as_raw_fd();
        // SAFETY: restores the attributes captured in `enable`.
        unsafe {
            libc::tcsetattr(fd, libc::TCSANOW, &self.original);
        }
    }
}

// On non-Unix systems input stays line-buffered: keys need Enter.
#[cfg(not(unix))]
struct RawMode;

#[cfg(not(unix))]
impl RawMode {
    fn enable() -> io::Result<RawMode> {
        Ok(RawMode)
    }
}

/// Full-screen terminal display.
pub struct TerminalDisplay {
    canvas: Canvas,
    banner: Option<&'static str>,
    keys: KeyDecoder,
    pressed: Option<Direction>,
    closed: bool,
    frame_time: Duration,
    next_frame: Instant,
    start: Instant,
    out: io::Stdout,
    _raw: RawMode,
}

impl TerminalDisplay {
    /// Take over the terminal for a board of side `length`.
    pub fn new(length: usize, fps: u32) -> io::Result<TerminalDisplay> {
        let raw = RawMode::enable()?;
        let mut out = io::stdout();
        // Alternate screen, hidden cursor, cleared.
        out.write_all(b"\x1b[?1049h\x1b[?25l\x1b[2J")?;
        out.flush()?;
        let now = Instant::now();
        Ok(TerminalDisplay {
            canvas: Canvas::new(length),
            banner: None,
            keys: KeyDecoder::default(),
            pressed: None,
            closed: false,
            frame_time: Duration::from_secs(1) / fps.max(1),
            next_frame: now,
            start: now,
            out,
            _raw: raw,
        })
    }
}

impl Drop for TerminalDisplay {
    fn drop(&mut self) {
        let _ = self.out.write_all(b"\x1b[0m\x1b[?25h\x1b[?1049l");
        let _ = self.out.flush();
    }
}

impl DisplayService for TerminalDisplay {
    fn is_direction_pressed(&self, direction: Direction) -> bool {
        self.pressed == Some(direction)
    }

    fn draw_tile(&mut self, row: f64, column: f64, tile: Tile, opacity: f64) {
        self.canvas.draw_tile(row, column, tile, opacity);
    }

    fn draw_win_banner(&mut self) {
        self.banner = Some(WIN_BANNER);
    }

    fn draw_fail_banner(&mut self) {
        self.banner = Some(FAIL_BANNER);
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read whatever keys arrived since the last frame. Only the first
    /// direction counts; keys typed while tiles animate are dropped.
    fn process_events(&mut self) -> io::Result<()> {
        self.pressed = None;
        let mut buffer = [0u8; 64];
        let bytes_read = match io::stdin().read(&mut buffer) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => 0,
            Err(e) => return Err(e),
        };
        for input in self.keys.feed(&buffer[..bytes_read]) {
            match input {
                Input::Move(direction) => {
                    self.pressed.get_or_insert(direction);
                }
                Input::Quit => self.closed = true,
            }
        }
        Ok(())
    }

    fn present(&mut self) -> io::Result<()> {
        let mut frame = String::from("\x1b[H\r\n  2048\x1b[K\r\n\r\n");
        self.canvas.render(&mut frame);
        frame.push_str("\r\n ");
        frame.push_str(self.banner.unwrap_or(CONTROLS));
        frame.push_str("\x1b[K\r\n");
        self.out.write_all(frame.as_bytes())?;
        self.out.flush()?;

        self.canvas.clear();
        self.banner = None;

        let now = Instant::now();
        if self.next_frame > now {
            thread::sleep(self.next_frame - now);
        }
        self.next_frame = self.next_frame.max(now) + self.frame_time;
        Ok(())
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

// =============================================================================
// Tests
// =============================================================================
