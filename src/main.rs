use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, info};

use highway_traffic::simulation::{SimWorld, TrafficConfig};

#[derive(Parser)]
#[command(name = "highway_traffic")]
#[command(about = "Headless highway traffic simulation")]
struct Cli {
    /// Number of simulation ticks to run
    #[arg(long, default_value = "3600")]
    ticks: u32,

    /// Seed for reproducible traffic
    #[arg(long)]
    seed: Option<u64>,

    /// INI file overriding the default tuning
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the road map every N ticks (0 disables)
    #[arg(long, default_value = "0")]
    map_every: u32,

    /// How often the overlay thread samples traffic counts, in milliseconds
    #[arg(long, default_value = "250")]
    overlay_ms: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TrafficConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TrafficConfig::default(),
    };

    run_headless(&cli, config)
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(cli: &Cli, config: TrafficConfig) -> Result<()> {
    info!("Running highway traffic simulation in headless mode...");
    info!("Ticks: {}, seed: {:?}", cli.ticks, cli.seed);

    let mut world = SimWorld::new(config, cli.seed)?;

    // Stands in for a renderer: reads the agent list from another thread
    let stop = Arc::new(AtomicBool::new(false));
    let overlay = {
        let handle = world.engine.handle();
        let stop = Arc::clone(&stop);
        let period = Duration::from_millis(cli.overlay_ms.max(1));
        thread::spawn(move || {
            let mut samples = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let counts = handle.lane_counts();
                debug!(
                    "Overlay: {} agents by lane {:?}",
                    counts.values().sum::<usize>(),
                    counts
                );
                samples += 1;
                thread::sleep(period);
            }
            samples
        })
    };

    if cli.map_every > 0 {
        world.print_summary();
        world.draw_map();
    }

    for tick in 1..=cli.ticks {
        world.tick();
        if cli.map_every > 0 && tick % cli.map_every == 0 {
            println!("--- After tick {} ---", tick);
            world.print_summary();
            world.draw_map();
        }
    }

    stop.store(true, Ordering::Relaxed);
    let samples = overlay
        .join()
        .map_err(|_| anyhow!("Overlay thread panicked"))?;
    info!(
        "Overlay reader took {} samples; {} levels played",
        samples, world.level
    );

    world.engine.stats().log_summary(world.engine.agent_count());
    Ok(())
}
