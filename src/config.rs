//! Configuration types for crc-monitor
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros, with environment
//!   fallbacks for the directory and the period
//! - Runtime configuration with validation

use crate::error::ConfigError;
use crate::walker::pool::MAX_WORKERS;
use crate::walker::queue::DEFAULT_QUEUE_CAPACITY;
use clap::Parser;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Minimum queue size
pub const MIN_QUEUE_SIZE: usize = 1;

/// Default verification period
pub const DEFAULT_PERIOD_SECS: u64 = 60;

/// Minimum verification period
pub const MIN_PERIOD_SECS: u64 = 1;

/// File-integrity monitor for one directory tree
#[derive(Parser, Debug, Clone)]
#[command(
    name = "crc-monitor",
    version,
    about = "File-integrity monitor: CRC-32 baselines with periodic and live verification",
    long_about = "Computes a CRC-32 for every regular file under a directory at startup and \
                  re-verifies them periodically, on filesystem change notifications and on \
                  SIGUSR1.\n\n\
                  Results are logged as 'Integrity check: OK' or \
                  'Integrity check: FAIL (<path> - <reason>)'.",
    after_help = "SIGNALS:\n    \
        SIGTERM   stop and exit\n    \
        SIGUSR1   queue a full verification pass\n    \
        SIGUSR2   write the snapshot (with --snapshot)\n\n\
        EXAMPLES:\n    \
        crc-monitor -D /etc -P 300\n    \
        CRC_SCAN_DIRECTORY=/srv/data crc-monitor -T 8 --exclude '\\.swp$'\n    \
        crc-monitor -D /opt/app --snapshot /var/lib/crc-monitor/app.json"
)]
pub struct CliArgs {
    /// Directory to monitor
    #[arg(short = 'D', long = "dir", env = "CRC_SCAN_DIRECTORY", value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Verification period in seconds [default: 60; 0 or garbage also means 60]
    #[arg(short = 'P', long, env = "CRC_SCAN_DIRECTORY_PERIOD", value_name = "SECS")]
    pub period: Option<String>,

    /// Number of worker threads for checksum calculation (0 = auto)
    #[arg(short = 'T', long = "worker-threads", default_value_t = 0, value_name = "NUM")]
    pub worker_threads: usize,

    /// Work queue size
    #[arg(short = 'Q', long = "queue", default_value_t = DEFAULT_QUEUE_CAPACITY, value_name = "NUM")]
    pub queue_size: usize,

    /// Exclude paths matching pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Write a JSON snapshot of the checksum table here on SIGUSR2 and on exit
    #[arg(long, value_name = "FILE")]
    pub snapshot: Option<PathBuf>,

    /// Verbose output (per-file results)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Canonical root of the watched tree
    pub root: PathBuf,

    /// Number of worker threads
    pub worker_count: usize,

    /// Work queue capacity
    pub queue_size: usize,

    /// Interval between verification passes
    pub period: Duration,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Snapshot target
    pub snapshot_path: Option<PathBuf>,
}

impl MonitorConfig {
    /// Configuration with defaults for `root`
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Self {
            root: validate_root(root.as_ref())?,
            worker_count: default_workers(),
            queue_size: DEFAULT_QUEUE_CAPACITY,
            period: Duration::from_secs(DEFAULT_PERIOD_SECS),
            exclude_patterns: Vec::new(),
            snapshot_path: None,
        })
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let dir = args
            .dir
            .filter(|d| !d.as_os_str().is_empty())
            .ok_or(ConfigError::MissingDirectory)?;

        let workers = if args.worker_threads == 0 {
            default_workers()
        } else {
            args.worker_threads
        };

        let snapshot = match args.snapshot {
            Some(path) => Some(validate_snapshot_path(path)?),
            None => None,
        };

        let mut config = Self::new(dir)?
            .with_workers(workers)?
            .with_queue_size(args.queue_size)?
            .with_period(resolve_period(args.period.as_deref()))?
            .with_excludes(args.exclude_patterns.as_slice())?;
        config.snapshot_path = snapshot;

        Ok(config)
    }

    /// Set the worker count
    pub fn with_workers(mut self, count: usize) -> Result<Self, ConfigError> {
        if count == 0 || count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count,
                max: MAX_WORKERS,
            });
        }
        self.worker_count = count;
        Ok(self)
    }

    /// Set the queue capacity
    pub fn with_queue_size(mut self, size: usize) -> Result<Self, ConfigError> {
        if size < MIN_QUEUE_SIZE {
            return Err(ConfigError::InvalidQueueSize {
                size,
                min: MIN_QUEUE_SIZE,
            });
        }
        self.queue_size = size;
        Ok(self)
    }

    /// Set the verification period
    pub fn with_period(mut self, period: Duration) -> Result<Self, ConfigError> {
        if period < Duration::from_secs(MIN_PERIOD_SECS) {
            return Err(ConfigError::InvalidPeriod {
                secs: period.as_secs(),
                min: MIN_PERIOD_SECS,
            });
        }
        self.period = period;
        Ok(self)
    }

    /// Compile and add exclude patterns
    pub fn with_excludes<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self, ConfigError> {
        for p in patterns {
            let p = p.as_ref();
            let re = Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                pattern: p.to_string(),
                reason: e.to_string(),
            })?;
            self.exclude_patterns.push(re);
        }
        Ok(self)
    }

    /// Set the snapshot target
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        self.snapshot_path = Some(validate_snapshot_path(path.into())?);
        Ok(self)
    }

    /// Check if a path should be excluded
    pub fn is_excluded(&self, path: &Path) -> bool {
        crate::walker::discover::is_excluded(path, &self.exclude_patterns)
    }
}

/// Period from `-P` or the environment; zero or unparsable means the default
fn resolve_period(raw: Option<&str>) -> Duration {
    let Some(raw) = raw else {
        return Duration::from_secs(DEFAULT_PERIOD_SECS);
    };

    match raw.trim().parse::<u64>() {
        Ok(secs) if secs >= MIN_PERIOD_SECS => Duration::from_secs(secs),
        _ => {
            info!(
                value = raw,
                default_secs = DEFAULT_PERIOD_SECS,
                "Scan period is not set or invalid, using the default"
            );
            Duration::from_secs(DEFAULT_PERIOD_SECS)
        }
    }
}

fn validate_root(dir: &Path) -> Result<PathBuf, ConfigError> {
    if !dir.exists() {
        return Err(ConfigError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(ConfigError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    // Watch events carry canonical paths; table keys must match them
    dir.canonicalize()
        .map_err(|_| ConfigError::DirectoryNotFound {
            path: dir.to_path_buf(),
        })
}

fn validate_snapshot_path(path: PathBuf) -> Result<PathBuf, ConfigError> {
    if path.is_dir() {
        return Err(ConfigError::InvalidSnapshotPath {
            path,
            reason: "is a directory".to_string(),
        });
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            let reason = format!("Parent directory '{}' does not exist", parent.display());
            return Err(ConfigError::InvalidSnapshotPath { path, reason });
        }
    }
    Ok(path)
}
