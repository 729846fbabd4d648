use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;

use rail_sim::simulation::{SimConfig, SimWorld};

#[derive(Parser)]
#[command(name = "rail_sim")]
#[command(about = "Headless rail vehicle simulation on the demo track")]
struct Cli {
    /// Number of vehicles to place on the track
    #[arg(long, default_value = "24")]
    vehicles: usize,

    /// Number of simulation ticks to run
    #[arg(long, default_value = "600")]
    ticks: u32,

    /// Time delta per tick in seconds (clamped to the configured maximum)
    #[arg(long, default_value = "0.0333")]
    delta: f32,

    /// Shuffle vehicle placement with this seed
    #[arg(long)]
    seed: Option<u64>,

    /// Print the world state every N ticks (0 prints only the final state)
    #[arg(long, default_value = "0")]
    summary_every: u32,

    /// Cruise speed on straight track
    #[arg(long)]
    max_speed: Option<f32>,

    /// Speed limit in curves
    #[arg(long)]
    curve_speed: Option<f32>,
}

impl Cli {
    fn config(&self) -> SimConfig {
        let defaults = SimConfig::default();
        SimConfig {
            linear_max_speed: self.max_speed.unwrap_or(defaults.linear_max_speed),
            curve_max_speed: self.curve_speed.unwrap_or(defaults.curve_max_speed),
            ..defaults
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    run_headless(&cli)
}

/// Run the simulation without any rendering
fn run_headless(cli: &Cli) -> Result<()> {
    info!(
        "Running rail simulation: {} vehicles, {} ticks, delta {}s",
        cli.vehicles, cli.ticks, cli.delta
    );

    let config = cli.config();
    let mut world = match cli.seed {
        Some(seed) => SimWorld::create_test_world_with_seed(config, cli.vehicles, seed)?,
        None => SimWorld::create_test_world(config, cli.vehicles)?,
    };

    println!("Initial state:");
    world.print_summary();
    println!();

    for tick in 1..=cli.ticks {
        world.tick(cli.delta);

        if cli.summary_every > 0 && tick % cli.summary_every == 0 && tick < cli.ticks {
            println!("--- After tick {} ({:.1}s simulated time) ---", tick, world.time);
            world.print_summary();
            println!();
        }
    }

    println!("=== Final State ===");
    world.print_summary();
    world.log_summary();
    Ok(())
}
