//! Per-file outcomes and per-cycle tallies
//!
//! Every reconciliation unit produces exactly one [`Outcome`], which is both
//! logged and added to the [`Tally`] of the cycle that submitted it. A
//! finished cycle freezes its tally into a [`ScanSummary`].

use crate::content::Crc32;
use crate::store::FileStatus;
use crate::walker::queue::ScanMode;
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error};

/// What a reconciliation unit found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// First sighting; baseline stored
    Recorded(Crc32),

    /// Matches the baseline
    Ok(Crc32),

    /// Not in the table during a verify-only pass
    New,

    /// Differs from the baseline
    Mismatch { expected: Crc32, actual: Crc32 },

    /// Could not be opened or read
    Unreadable { reason: String },

    /// Known file no longer exists
    Removed,
}

impl Outcome {
    /// True for anything that makes a cycle not-OK
    pub fn is_failure(&self) -> bool {
        !matches!(self, Outcome::Recorded(_) | Outcome::Ok(_))
    }

    /// Status this outcome maps to in the table
    pub fn status(&self) -> FileStatus {
        match self {
            Outcome::Recorded(_) | Outcome::New => FileStatus::New,
            Outcome::Ok(_) => FileStatus::Ok,
            Outcome::Mismatch { .. } | Outcome::Unreadable { .. } => FileStatus::Fail,
            Outcome::Removed => FileStatus::Absent,
        }
    }

    /// Failure reason as it appears after the dash in a FAIL line
    pub fn reason(&self) -> Option<String> {
        match self {
            Outcome::Recorded(_) | Outcome::Ok(_) => None,
            Outcome::New => Some("new file".to_string()),
            Outcome::Mismatch { expected, actual } => Some(format!(
                "CRC mismatch: expected {} actual {}",
                expected, actual
            )),
            Outcome::Unreadable { reason } => Some(reason.clone()),
            Outcome::Removed => Some("removed".to_string()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "FAIL ({})", reason),
            None => f.write_str("OK"),
        }
    }
}

/// Emit the integrity line for one outcome
pub fn log_outcome(path: &Path, outcome: &Outcome) {
    match outcome.reason() {
        Some(reason) => error!("Integrity check: FAIL ({} - {})", path.display(), reason),
        None => debug!(path = %path.display(), outcome = ?outcome, "Integrity check: OK"),
    }
}

/// One file's result in a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: Outcome,
}

/// Counters shared by every unit of one cycle
#[derive(Debug, Default)]
pub struct Tally {
    recorded: AtomicU64,
    ok: AtomicU64,
    new: AtomicU64,
    mismatched: AtomicU64,
    unreadable: AtomicU64,
    removed: AtomicU64,
    rejected: AtomicU64,
    reports: Mutex<Vec<FileReport>>,
    rejected_paths: Mutex<Vec<PathBuf>>,
}

impl Tally {
    /// Empty tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one outcome
    pub fn record(&self, path: PathBuf, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Recorded(_) => &self.recorded,
            Outcome::Ok(_) => &self.ok,
            Outcome::New => &self.new,
            Outcome::Mismatch { .. } => &self.mismatched,
            Outcome::Unreadable { .. } => &self.unreadable,
            Outcome::Removed => &self.removed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.reports.lock().push(FileReport { path, outcome });
    }

    /// Note a unit the queue refused
    pub fn reject(&self, path: PathBuf) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        self.rejected_paths.lock().push(path);
    }

    /// True while nothing failed and nothing was rejected
    pub fn all_ok(&self) -> bool {
        self.new.load(Ordering::Relaxed)
            + self.mismatched.load(Ordering::Relaxed)
            + self.unreadable.load(Ordering::Relaxed)
            + self.removed.load(Ordering::Relaxed)
            + self.rejected.load(Ordering::Relaxed)
            == 0
    }

    /// Freeze into a summary
    pub fn summarize(&self, mode: ScanMode, duration: Duration) -> ScanSummary {
        let mut reports = self.reports.lock().clone();
        reports.sort_by(|a, b| a.path.cmp(&b.path));
        let mut rejected_paths = self.rejected_paths.lock().clone();
        rejected_paths.sort();

        ScanSummary {
            mode,
            recorded: self.recorded.load(Ordering::Relaxed),
            ok: self.ok.load(Ordering::Relaxed),
            new: self.new.load(Ordering::Relaxed),
            mismatched: self.mismatched.load(Ordering::Relaxed),
            unreadable: self.unreadable.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            duration,
            reports,
            rejected_paths,
        }
    }
}

/// Result of one finished cycle
#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub mode: ScanMode,
    pub recorded: u64,
    pub ok: u64,
    pub new: u64,
    pub mismatched: u64,
    pub unreadable: u64,
    pub removed: u64,
    pub rejected: u64,
    pub duration: Duration,

    /// Per-file outcomes, sorted by path
    pub reports: Vec<FileReport>,

    /// Files whose unit the queue refused, sorted
    pub rejected_paths: Vec<PathBuf>,
}

impl ScanSummary {
    /// True if every file was recorded or matched and nothing was rejected
    pub fn all_ok(&self) -> bool {
        self.failures() == 0 && self.rejected == 0
    }

    /// Number of failing outcomes
    pub fn failures(&self) -> u64 {
        self.new + self.mismatched + self.unreadable + self.removed
    }

    /// Files that produced an outcome
    pub fn checked(&self) -> u64 {
        self.recorded + self.ok + self.failures()
    }

    /// Outcome for `path`, if it was reported this cycle
    ///
    /// A path can appear twice in a verify pass over known files (removed,
    /// then unreadable); the first report wins.
    pub fn outcome(&self, path: &Path) -> Option<&Outcome> {
        self.reports
            .iter()
            .find(|r| r.path == path)
            .map(|r| &r.outcome)
    }

    /// All outcomes reported for `path`
    pub fn outcomes<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a Outcome> + 'a {
        self.reports
            .iter()
            .filter(move |r| r.path == path)
            .map(|r| &r.outcome)
    }
}
