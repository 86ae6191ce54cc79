//! # Animated 2048 CLI
//!
//! Play 2048 with animated slides and merges in the terminal, or run
//! headless simulations of the grid engine with simple policies.

mod terminal;

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use slide_2048_core::{Direction, GridEngine, Tile, TurnController, TurnState};
use tracing::{debug, info};
use tracing_subscriber::filter::EnvFilter;

use crate::terminal::TerminalDisplay;

#[derive(Parser, Debug)]
#[command(name = "slide-2048")]
#[command(author, version, about = "Play animated 2048 in the terminal or run simulations")]
struct Args {
    /// Random seed for tile spawns (defaults to the wall clock)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Board side length
    #[arg(short = 'n', long, default_value = "4", value_parser = clap::value_parser!(u8).range(2..=8))]
    size: u8,

    /// Frames per second in interactive mode
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u32).range(1..=240))]
    fps: u32,

    /// Number of episodes to run in headless mode
    #[arg(short, long)]
    episodes: Option<u32>,

    /// Maximum moves per episode in headless mode (0 = unlimited)
    #[arg(short, long, default_value = "10000")]
    max_steps: u32,

    /// Policy for headless mode
    #[arg(short, long, value_enum, default_value = "random")]
    policy: Policy,

    /// Show the board after each move in headless mode
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    /// Random legal moves
    Random,
    /// Cycle through moves: Left, Down, Right, Up
    Cycle,
}

fn main() -> Result<()> {
    // Logs go to stderr so they can be redirected away from the board.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(clock_seed);
    info!(seed, size = args.size, "starting");

    if let Some(episodes) = args.episodes {
        run_headless(&args, seed, episodes)
    } else {
        run_interactive(&args, seed)
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Run the animated game until the player quits.
fn run_interactive(args: &Args, seed: u64) -> Result<()> {
    let grid = GridEngine::with_seed(args.size as usize, seed).context("failed to set up board")?;
    let mut controller = TurnController::new(grid)?;

    let mut display =
        TerminalDisplay::new(args.size as usize, args.fps).context("failed to set up terminal")?;
    let outcome = controller.run(&mut display);
    drop(display);
    outcome.context("game loop failed")?;

    let grid = controller.grid();
    print!("{grid}");
    match controller.state() {
        TurnState::Success => println!("You win! Seed: {seed}"),
        TurnState::Fail => println!("Game over. Max tile: {}. Seed: {seed}", grid.max_tile()),
        _ => println!("Goodbye!"),
    }
    Ok(())
}

/// Play `episodes` games without animation and print summary statistics.
fn run_headless(args: &Args, seed: u64, episodes: u32) -> Result<()> {
    let size = args.size as usize;
    let mut wins = 0u32;
    let mut losses = 0u32;
    let mut total_steps: u64 = 0;
    let mut max_tile_overall = Tile::Empty;
    let mut max_tiles: BTreeMap<u32, u32> = BTreeMap::new();

    // Separate RNG for move selection so spawns stay tied to the seed.
    let mut policy_rng = SmallRng::seed_from_u64(seed.wrapping_add(1000));

    for episode in 0..episodes {
        let episode_seed = seed.wrapping_add(episode as u64);
        let mut grid = GridEngine::with_seed(size, episode_seed)?;
        let mut steps = 0;
        let mut cycle = 0;

        while !grid.is_game_over() && (args.max_steps == 0 || steps < args.max_steps) {
            grid.reset_states();
            let legal = grid.legal_directions()?;
            let direction = match args.policy {
                Policy::Random => select_random_direction(&legal, &mut policy_rng),
                Policy::Cycle => select_cycle_direction(&legal, &mut cycle),
            };
            let Some(direction) = direction else {
                break;
            };

            grid.move_tiles(direction)?;
            if grid.has_something_changed() {
                grid.new_tile()?;
            }
            steps += 1;

            if args.verbose {
                println!("Episode {} Step {}: {:?}", episode + 1, steps, direction);
                print!("{grid}");
            }
        }

        if grid.is_success() {
            wins += 1;
        } else if grid.is_game_over() {
            losses += 1;
        }
        total_steps += steps as u64;
        let max_tile = grid.max_tile();
        max_tile_overall = max_tile_overall.max(max_tile);
        *max_tiles.entry(max_tile.value()).or_insert(0) += 1;

        debug!(episode = episode + 1, steps, max_tile = %max_tile, "episode finished");
        if args.verbose {
            println!(
                "Episode {}: MaxTile={}, Steps={}, Won={}",
                episode + 1,
                max_tile,
                steps,
                grid.is_success()
            );
        }
    }

    // Output results in parseable format
    let played = episodes.max(1) as f64;
    println!("=== Simulation Results ===");
    println!("episodes={}", episodes);
    println!("policy={:?}", args.policy);
    println!("seed={}", seed);
    println!("size={}", size);
    println!("max_steps={}", args.max_steps);
    println!("wins={}", wins);
    println!("losses={}", losses);
    println!("unfinished={}", episodes - wins - losses);
    println!("win_rate={:.4}", wins as f64 / played);
    println!("avg_steps={:.2}", total_steps as f64 / played);
    println!("max_tile_overall={}", max_tile_overall.value());
    let distribution: Vec<String> = max_tiles
        .iter()
        .map(|(tile, count)| format!("{}:{}", tile, count))
        .collect();
    println!("tile_distribution={}", distribution.join(","));
    Ok(())
}

/// Select a random legal direction.
fn select_random_direction(legal: &[Direction], rng: &mut impl Rng) -> Option<Direction> {
    if legal.is_empty() {
        None
    } else {
        Some(legal[rng.gen_range(0..legal.len())])
    }
}

/// Select directions in a cycle: Left, Down, Right, Up, skipping illegal ones.
fn select_cycle_direction(legal: &[Direction], cycle: &mut usize) -> Option<Direction> {
    let order = [
        Direction::Left,
        Direction::Down,
        Direction::Right,
        Direction::Up,
    ];

    for _ in 0..order.len() {
        let direction = order[*cycle % order.len()];
        *cycle += 1;
        if legal.contains(&direction) {
            return Some(direction);
        }
    }

    None
}
