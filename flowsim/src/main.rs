//! # flowsim Binary
//!
//! Loads a line configuration, builds the plant and runs the tick loop until
//! interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Run the bundled line in real time
//! flowsim --config flowsim/config/smart_delivery.toml --switch-on
//!
//! # Advance 600 ticks as fast as possible and print every tag as JSON
//! flowsim -c flowsim/config/smart_delivery.toml --switch-on --ticks 600 --dump
//!
//! # Verbose JSON logs
//! flowsim -c line.toml -v --json
//! ```

use clap::Parser;
use flowsim::{Plant, SimRunner};
use flowsim_common::config::{ConfigLoader, LogLevel};
use flowsim_common::consts::DEFAULT_CONFIG_PATH;
use flowsim_common::line::config::LineConfig;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// flowsim - conveyor line transport simulator
#[derive(Parser, Debug)]
#[command(name = "flowsim")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Discrete-time transport simulator for conveyor lines")]
#[command(long_about = None)]
struct Args {
    /// Path to the line configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Advance this many ticks without pacing, then exit
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Enable every area before the first tick
    #[arg(long)]
    switch_on: bool,

    /// Print all tag values as JSON on exit
    #[arg(long)]
    dump: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("flowsim startup failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let line = LineConfig::load(&args.config);
    let level = line
        .as_ref()
        .map(|l| l.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, level);

    info!("flowsim v{} starting...", env!("CARGO_PKG_VERSION"));
    let line = line?;
    info!("Loaded line {} from {}", line.shared.service_name, args.config.display());

    let mut plant = Plant::from_config(&line)?;
    if args.switch_on {
        plant.switch_on();
    }
    let mut runner = SimRunner::new(plant, &line.runner);

    let running = runner.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    match args.ticks {
        Some(n) => runner.run_ticks(n)?,
        None => runner.run()?,
    }

    let plant = runner.plant();
    let plant = plant.lock();
    let counters = plant.counters();
    info!(
        "Simulated {:.1}s in {} ticks: inserted={} removed={} handovers={} in_flight={}",
        plant.elapsed(),
        plant.tick(),
        counters.inserted,
        counters.removed,
        counters.handovers,
        plant.item_count()
    );
    if args.dump {
        println!("{}", serde_json::to_string_pretty(&plant.tag_values())?);
    }

    info!("flowsim shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        match configured {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
