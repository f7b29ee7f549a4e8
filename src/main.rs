//! crc-monitor - File-Integrity Monitoring Daemon
//!
//! Entry point for the daemon.

use anyhow::{Context, Result};
use clap::Parser;
use crc_monitor::config::{CliArgs, MonitorConfig};
use crc_monitor::triggers::Triggers;
use crc_monitor::walker::{Monitor, ScanMode};
use signal_hook::consts::signal::{SIGCONT, SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Registered before any thread exists so the handlers cover all of them.
    // SIGINT, SIGQUIT, SIGHUP and SIGCONT are taken over only to be ignored.
    let mut signals = Signals::new([SIGTERM, SIGUSR1, SIGUSR2, SIGINT, SIGQUIT, SIGHUP, SIGCONT])
        .context("Failed to set signal handlers")?;

    // Validate and create config
    let config = MonitorConfig::from_args(args).context("Invalid configuration")?;
    let period = config.period;
    let snapshot_path = config.snapshot_path.clone();

    let monitor = Arc::new(Monitor::new(config).context("Failed to initialize monitor")?);

    // Baselines first, then live changes
    monitor.scan(ScanMode::Record);
    monitor
        .start_watching()
        .context("Failed to start watcher")?;

    let mut triggers =
        Triggers::start(Arc::clone(&monitor), period).context("Failed to start scan triggers")?;

    info!(
        root = %monitor.config().root.display(),
        period_secs = period.as_secs(),
        "crc-monitor running"
    );

    for signal in signals.forever() {
        match signal {
            SIGTERM => {
                info!("SIGTERM received, shutting down...");
                break;
            }
            SIGUSR1 => {
                info!("Rescan requested");
                if !triggers.request_rescan() {
                    warn!("Rescan thread is gone");
                }
            }
            SIGUSR2 => save_snapshot(&monitor, snapshot_path.as_deref()),
            other => debug!(signal = other, "Ignoring signal"),
        }
    }

    // Stop the pool first so a running cycle drains quickly
    monitor.shutdown();
    triggers.stop();

    save_snapshot(&monitor, snapshot_path.as_deref());
    Ok(())
}

fn save_snapshot(monitor: &Monitor, path: Option<&Path>) {
    match path {
        Some(path) => {
            if let Err(e) = monitor.write_snapshot(path) {
                error!("{:#}", e);
            }
        }
        None => debug!("No snapshot path configured"),
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let default = if verbose {
        "crc_monitor=debug,warn"
    } else {
        "crc_monitor=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(anyhow::Error::msg)
        .context("Failed to install log subscriber")
}
