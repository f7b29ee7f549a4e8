//! Error types for crc-monitor
//!
//! This module defines the error hierarchy for:
//! - Configuration and CLI errors (fatal at startup)
//! - Checksum I/O errors (contained per reconciliation unit)
//! - Watch registration errors (abort one directory, not the scan)
//! - Worker pool and submission errors
//! - Snapshot persistence errors
//!
//! Per-file integrity findings (new file, CRC mismatch, removed file) are
//! not errors: they are [`Outcome`](crate::walker::Outcome) values that end
//! up in the log and in the cycle summary.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the crc-monitor library
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Watch registration errors
    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Snapshot errors
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Checksum errors outside a reconciliation unit
    #[error("Checksum error: {0}")]
    Checksum(#[from] ChecksumError),

    /// I/O errors outside a single reconciliation unit
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Directory not given on the command line or in the environment
    #[error("directory is not specified (use --dir or CRC_SCAN_DIRECTORY)")]
    MissingDirectory,

    /// Watched directory does not exist
    #[error("\"{path}\" not exists")]
    DirectoryNotFound { path: PathBuf },

    /// Watched path exists but is not a directory
    #[error("\"{path}\" is not a directory")]
    NotADirectory { path: PathBuf },

    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid queue size
    #[error("Invalid queue size {size}: must be at least {min}")]
    InvalidQueueSize { size: usize, min: usize },

    /// Invalid timer period
    #[error("Invalid period {secs}s: must be at least {min}s")]
    InvalidPeriod { secs: u64, min: u64 },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Snapshot path error
    #[error("Invalid snapshot path '{path}': {reason}")]
    InvalidSnapshotPath { path: PathBuf, reason: String },
}

/// Checksum I/O errors
///
/// The display text is what ends up after the dash in
/// `Integrity check: FAIL (<path> - <reason>)`.
#[derive(Error, Debug)]
pub enum ChecksumError {
    /// File could not be opened
    #[error("open failed: {0}")]
    Open(#[source] std::io::Error),

    /// File was opened but a read failed
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),
}

impl ChecksumError {
    /// Underlying I/O error kind
    pub fn kind(&self) -> std::io::ErrorKind {
        match self {
            ChecksumError::Open(e) | ChecksumError::Read(e) => e.kind(),
        }
    }
}

/// Watch registration errors
#[derive(Error, Debug)]
pub enum WatchError {
    /// Path does not exist or is not a directory
    #[error("Cannot add watch to '{path}': not a directory")]
    InvalidPath { path: PathBuf },

    /// Kernel watch limit reached (fs.inotify.max_user_watches)
    #[error("Cannot add watch to '{path}': watch limit exceeded")]
    LimitExceeded { path: PathBuf },

    /// Backend failure
    #[error("Cannot add watch to '{path}': {reason}")]
    Backend { path: PathBuf, reason: String },

    /// Watcher could not be created at all
    #[error("Cannot initialize watcher: {0}")]
    InitFailed(String),
}

impl WatchError {
    /// Map a `notify` error for `path` onto the watch error taxonomy
    pub fn from_notify(path: PathBuf, err: notify::Error) -> Self {
        match err.kind {
            notify::ErrorKind::MaxFilesWatch => WatchError::LimitExceeded { path },
            notify::ErrorKind::PathNotFound => WatchError::InvalidPath { path },
            notify::ErrorKind::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound => {
                WatchError::InvalidPath { path }
            }
            _ => WatchError::Backend {
                path,
                reason: err.to_string(),
            },
        }
    }
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Thread could not be spawned
    #[error("Failed to spawn thread '{name}': {reason}")]
    InitFailed { name: String, reason: String },

    /// Thread panicked
    #[error("Thread '{name}' panicked")]
    Panicked { name: String },
}

/// Submission errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Bounded queue is at capacity; the unit was dropped
    #[error("ThreadPool queue is full")]
    QueueFull { path: PathBuf },

    /// Pool is shutting down
    #[error("ThreadPool is stopped")]
    Stopped { path: PathBuf },
}

/// Snapshot persistence errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// File operations
    #[error("I/O error writing '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for MonitorError
pub type Result<T> = std::result::Result<T, MonitorError>;
