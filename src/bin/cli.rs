// src/bin/cli.rs
//
//! Monitor CLI.
//!
//! Examples:
//! ```bash
//! inferwatch                                   # loop forever, default config
//! inferwatch -c config/monitoring_config.yaml --once
//! LOG_LEVEL=DEBUG inferwatch --once
//! inferwatch -vv                               # trace-level logging
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::thread;
use tracing::{error, info};

use inferwatch::config::{load_config, resolve_config_path};
use inferwatch::cycle::Monitor;
use inferwatch::logging::init_logging;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Monitor config (YAML). Falls back to $MONITORING_CONFIG, then
    /// config/monitoring_config.yaml.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run a single check cycle and exit.
    #[arg(long)]
    once: bool,

    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Debug, -vv = Trace",
    )]
    verbose: u8,
}

fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config);
    let cfg = load_config(&config_path)?;

    init_logging(&cfg.logging, cli.verbose)?;
    info!("Loaded config from {}", config_path.display());

    let mut monitor = Monitor::from_config(&cfg).context("Failed to start monitor")?;

    if cli.once {
        monitor.run_check_once()?;
        return Ok(());
    }

    let interval = cfg.monitoring.check_interval();
    loop {
        if let Err(e) = monitor.run_check_once() {
            // Losing the metrics sink is not recoverable
            error!("Check cycle could not be persisted: {:#}", e);
            return Err(e);
        }
        thread::sleep(interval);
    }
}
