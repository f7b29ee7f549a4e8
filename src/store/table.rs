//! In-memory checksum table
//!
//! Maps a file path to its baseline digest, the digest seen by the most
//! recent verification, and the resulting status.
//!
//! Locking discipline:
//! - lookups and verification updates take the shared lock; the observed
//!   digest and status live in atomics so many verifiers proceed together
//! - the exclusive lock is taken only to insert a never-seen key or to
//!   replace a baseline explicitly
//!
//! A baseline taken from a create event is provisional: the writer may
//! not be done yet. The first matching observation confirms it, and the
//! first record of different content settles it to the new digest.
//!
//! The lock is never held across file I/O.

use crate::content::Crc32;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// Integrity status of a tracked file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum FileStatus {
    /// Last verification matched the baseline
    Ok = 0,
    /// Last verification failed (mismatch or unreadable)
    Fail = 1,
    /// Recorded, not verified yet
    New = 2,
    /// File no longer exists
    Absent = 3,
}

impl FileStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => FileStatus::Ok,
            1 => FileStatus::Fail,
            2 => FileStatus::New,
            _ => FileStatus::Absent,
        }
    }

    /// Upper-case label used in logs and snapshots
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Ok => "OK",
            FileStatus::Fail => "FAIL",
            FileStatus::New => "NEW",
            FileStatus::Absent => "ABSENT",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of one table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumRecord {
    /// Digest taken as ground truth
    pub baseline: Crc32,

    /// Digest seen by the most recent verification
    pub last_observed: Crc32,

    /// Status from the most recent verification
    pub status: FileStatus,
}

#[derive(Debug)]
struct RecordCell {
    baseline: Crc32,
    observed: AtomicU32,
    status: AtomicU8,
    provisional: AtomicBool,
}

impl RecordCell {
    fn new(digest: Crc32) -> Self {
        Self::with_provisional(digest, false)
    }

    fn with_provisional(digest: Crc32, provisional: bool) -> Self {
        Self {
            baseline: digest,
            observed: AtomicU32::new(digest.value()),
            status: AtomicU8::new(FileStatus::New as u8),
            provisional: AtomicBool::new(provisional),
        }
    }

    fn snapshot(&self) -> ChecksumRecord {
        ChecksumRecord {
            baseline: self.baseline,
            last_observed: Crc32(self.observed.load(Ordering::Acquire)),
            status: FileStatus::from_u8(self.status.load(Ordering::Acquire)),
        }
    }
}

/// Result of [`ChecksumTable::insert_if_absent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// The key was new and now holds the given digest
    Inserted,
    /// Another writer got there first; this is its baseline
    Existing(Crc32),
}

/// Concurrent path -> checksum map
#[derive(Debug, Default)]
pub struct ChecksumTable {
    records: RwLock<HashMap<PathBuf, RecordCell>>,
}

impl ChecksumTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Baseline digest for `path`, if tracked
    pub fn baseline(&self, path: &Path) -> Option<Crc32> {
        self.records.read().get(path).map(|cell| cell.baseline)
    }

    /// Copy of the full record for `path`
    pub fn get(&self, path: &Path) -> Option<ChecksumRecord> {
        self.records.read().get(path).map(RecordCell::snapshot)
    }

    /// Insert a baseline unless the key already exists
    ///
    /// Check and insert happen under one exclusive lock, so two workers that
    /// both saw the key missing cannot both insert.
    pub fn insert_if_absent(&self, path: PathBuf, digest: Crc32) -> Insert {
        self.insert_cell(path, digest, false)
    }

    /// [`insert_if_absent`](Self::insert_if_absent) for a file that may
    /// still be being written
    pub fn insert_provisional(&self, path: PathBuf, digest: Crc32) -> Insert {
        self.insert_cell(path, digest, true)
    }

    fn insert_cell(&self, path: PathBuf, digest: Crc32, provisional: bool) -> Insert {
        match self.records.write().entry(path) {
            Entry::Occupied(existing) => Insert::Existing(existing.get().baseline),
            Entry::Vacant(slot) => {
                slot.insert(RecordCell::with_provisional(digest, provisional));
                Insert::Inserted
            }
        }
    }

    /// True while the baseline for `path` is still provisional
    pub fn is_provisional(&self, path: &Path) -> bool {
        self.records
            .read()
            .get(path)
            .is_some_and(|cell| cell.provisional.load(Ordering::Acquire))
    }

    /// Replace a provisional baseline with `digest`
    ///
    /// Returns false, changing nothing, if the baseline is not provisional.
    pub fn settle_provisional(&self, path: &Path, digest: Crc32) -> bool {
        let mut records = self.records.write();
        match records.get_mut(path) {
            Some(cell) if cell.provisional.load(Ordering::Acquire) => {
                *cell = RecordCell::new(digest);
                true
            }
            _ => false,
        }
    }

    /// Store a verification result. Returns false if `path` is not tracked.
    pub fn observe(&self, path: &Path, digest: Crc32, status: FileStatus) -> bool {
        let records = self.records.read();
        match records.get(path) {
            Some(cell) => {
                cell.observed.store(digest.value(), Ordering::Release);
                cell.status.store(status as u8, Ordering::Release);
                if status == FileStatus::Ok {
                    cell.provisional.store(false, Ordering::Release);
                }
                true
            }
            None => false,
        }
    }

    /// Update only the status. Returns false if `path` is not tracked.
    pub fn set_status(&self, path: &Path, status: FileStatus) -> bool {
        let records = self.records.read();
        match records.get(path) {
            Some(cell) => {
                cell.status.store(status as u8, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Replace the baseline for a tracked file, returning the previous one
    ///
    /// This is the only path that changes a confirmed baseline.
    pub fn rebaseline(&self, path: &Path, digest: Crc32) -> Option<Crc32> {
        let mut records = self.records.write();
        let cell = records.get_mut(path)?;
        let previous = cell.baseline;
        *cell = RecordCell::new(digest);
        cell.status.store(FileStatus::Ok as u8, Ordering::Release);
        Some(previous)
    }

    /// Snapshot of all tracked paths
    pub fn paths(&self) -> Vec<PathBuf> {
        self.records.read().keys().cloned().collect()
    }

    /// Snapshot of all records, sorted by path
    pub fn records(&self) -> Vec<(PathBuf, ChecksumRecord)> {
        let mut out: Vec<_> = self
            .records
            .read()
            .iter()
            .map(|(path, cell)| (path.clone(), cell.snapshot()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Number of tracked files
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_insert_then_lookup() {
        let table = ChecksumTable::new();
        let path = PathBuf::from("/data/a");

        assert_eq!(table.insert_if_absent(path.clone(), Crc32(1)), Insert::Inserted);
        assert_eq!(table.baseline(&path), Some(Crc32(1)));

        let record = table.get(&path).unwrap();
        assert_eq!(record.status, FileStatus::New);
        assert_eq!(record.last_observed, Crc32(1));
    }

    #[test]
    fn test_provisional_baseline_settles_or_confirms() {
        let table = ChecksumTable::new();
        let path = PathBuf::from("/data/a");

        table.insert_provisional(path.clone(), Crc32(1));
        assert!(table.is_provisional(&path));
        assert!(table.settle_provisional(&path, Crc32(2)));
        assert_eq!(table.baseline(&path), Some(Crc32(2)));
        assert_eq!(table.get(&path).unwrap().status, FileStatus::New);

        // Settled baselines are ordinary ones
        assert!(!table.is_provisional(&path));
        assert!(!table.settle_provisional(&path, Crc32(3)));
        assert_eq!(table.baseline(&path), Some(Crc32(2)));

        let other = PathBuf::from("/data/b");
        table.insert_provisional(other.clone(), Crc32(5));
        table.observe(&other, Crc32(6), FileStatus::Fail);
        assert!(table.is_provisional(&other));
        table.observe(&other, Crc32(5), FileStatus::Ok);
        assert!(!table.is_provisional(&other));
        assert!(!table.settle_provisional(&other, Crc32(7)));
    }

    #[test]
    fn test_second_insert_keeps_first_baseline() {
        let table = ChecksumTable::new();
        let path = PathBuf::from("/data/a");

        table.insert_if_absent(path.clone(), Crc32(1));
        assert_eq!(
            table.insert_if_absent(path.clone(), Crc32(2)),
            Insert::Existing(Crc32(1))
        );
        assert_eq!(table.baseline(&path), Some(Crc32(1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_observe_never_touches_baseline() {
        let table = ChecksumTable::new();
        let path = PathBuf::from("/data/a");
        table.insert_if_absent(path.clone(), Crc32(1));

        assert!(table.observe(&path, Crc32(9), FileStatus::Fail));

        let record = table.get(&path).unwrap();
        assert_eq!(record.baseline, Crc32(1));
        assert_eq!(record.last_observed, Crc32(9));
        assert_eq!(record.status, FileStatus::Fail);

        assert!(!table.observe(Path::new("/data/unknown"), Crc32(9), FileStatus::Ok));
    }

    #[test]
    fn test_rebaseline() {
        let table = ChecksumTable::new();
        let path = PathBuf::from("/data/a");
        table.insert_if_absent(path.clone(), Crc32(1));

        assert_eq!(table.rebaseline(&path, Crc32(7)), Some(Crc32(1)));
        let record = table.get(&path).unwrap();
        assert_eq!(record.baseline, Crc32(7));
        assert_eq!(record.status, FileStatus::Ok);

        assert_eq!(table.rebaseline(Path::new("/data/none"), Crc32(7)), None);
    }

    #[test]
    fn test_concurrent_first_insert_single_winner() {
        let table = Arc::new(ChecksumTable::new());
        let start = Arc::new(Barrier::new(8));
        let path = PathBuf::from("/data/contended");

        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let table = Arc::clone(&table);
                let start = Arc::clone(&start);
                let path = path.clone();
                thread::spawn(move || {
                    start.wait();
                    table.insert_if_absent(path, Crc32(i))
                })
            })
            .collect();

        let results: Vec<Insert> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| **r == Insert::Inserted).count();

        assert_eq!(winners, 1);
        assert_eq!(table.len(), 1);

        // Every loser saw the winner's digest
        let baseline = table.baseline(&path).unwrap();
        for r in results {
            if let Insert::Existing(d) = r {
                assert_eq!(d, baseline);
            }
        }
    }

    #[test]
    fn test_records_sorted() {
        let table = ChecksumTable::new();
        table.insert_if_absent(PathBuf::from("/b"), Crc32(2));
        table.insert_if_absent(PathBuf::from("/a"), Crc32(1));

        let paths: Vec<_> = table.records().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(FileStatus::Absent.to_string(), "ABSENT");
        assert_eq!(
            serde_json::to_string(&FileStatus::Fail).unwrap(),
            "\"FAIL\""
        );
    }
}
