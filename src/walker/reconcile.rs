//! Per-file reconciliation against the checksum table
//!
//! Given a path and a [`ScanMode`]:
//!
//! | in table | mode   | action                                         |
//! |----------|--------|------------------------------------------------|
//! | no       | Verify | NEW, table untouched                           |
//! | no       | Record | digest, insert-if-absent, RECORDED             |
//! | yes      | any    | digest, compare: OK or MISMATCH, baseline kept |
//!
//! A file announced by a create event is recorded with a provisional
//! baseline ([`reconcile_created`]). A later record of the same file that
//! reads different content replaces that baseline instead of failing.
//!
//! Open/read errors become an UNREADABLE outcome for that file only.

use crate::content::{digest_file, Crc32};
use crate::store::{ChecksumTable, FileStatus, Insert};
use crate::walker::queue::ScanMode;
use crate::walker::report::{log_outcome, Outcome, Tally};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Decide the outcome for one file and update the table accordingly
pub fn reconcile(table: &ChecksumTable, path: &Path, mode: ScanMode) -> Outcome {
    // Shared lock for the lookup only; released before any I/O
    let baseline = table.baseline(path);

    match baseline {
        None if !mode.records() => Outcome::New,
        None => match digest_file(path) {
            Ok(digest) => match table.insert_if_absent(path.to_path_buf(), digest) {
                Insert::Inserted => Outcome::Recorded(digest),
                // Lost the race to a concurrent first sighting
                Insert::Existing(expected) => compare(table, path, expected, digest),
            },
            Err(e) => Outcome::Unreadable {
                reason: e.to_string(),
            },
        },
        Some(expected) => match digest_file(path) {
            Ok(actual) => settle_or_compare(table, path, mode, expected, actual),
            Err(e) => {
                let status = if e.kind() == ErrorKind::NotFound {
                    FileStatus::Absent
                } else {
                    FileStatus::Fail
                };
                table.set_status(path, status);
                Outcome::Unreadable {
                    reason: e.to_string(),
                }
            }
        },
    }
}

/// Reconcile a file that has just appeared in a watched directory
pub fn reconcile_created(table: &ChecksumTable, path: &Path) -> Outcome {
    match digest_file(path) {
        Ok(digest) => match table.insert_provisional(path.to_path_buf(), digest) {
            Insert::Inserted => Outcome::Recorded(digest),
            Insert::Existing(expected) => {
                settle_or_compare(table, path, ScanMode::Record, expected, digest)
            }
        },
        Err(e) => Outcome::Unreadable {
            reason: e.to_string(),
        },
    }
}

fn settle_or_compare(
    table: &ChecksumTable,
    path: &Path,
    mode: ScanMode,
    expected: Crc32,
    actual: Crc32,
) -> Outcome {
    if mode.records() && expected != actual && table.settle_provisional(path, actual) {
        return Outcome::Recorded(actual);
    }
    compare(table, path, expected, actual)
}

fn compare(table: &ChecksumTable, path: &Path, expected: Crc32, actual: Crc32) -> Outcome {
    let outcome = if expected == actual {
        Outcome::Ok(actual)
    } else {
        Outcome::Mismatch { expected, actual }
    };
    table.observe(path, actual, outcome.status());
    outcome
}

/// Body of a reconciliation unit: reconcile, log, tally
pub fn reconcile_and_report(table: &ChecksumTable, tally: &Tally, path: PathBuf, mode: ScanMode) {
    let outcome = reconcile(table, &path, mode);
    log_outcome(&path, &outcome);
    tally.record(path, outcome);
}

/// Build the closure a worker runs for `path`
pub fn reconcile_unit(
    table: Arc<ChecksumTable>,
    tally: Arc<Tally>,
    path: PathBuf,
    mode: ScanMode,
) -> impl FnOnce() + Send + 'static {
    move || reconcile_and_report(&table, &tally, path, mode)
}

/// Build the closure a worker runs for a freshly created `path`
pub fn created_unit(
    table: Arc<ChecksumTable>,
    tally: Arc<Tally>,
    path: PathBuf,
) -> impl FnOnce() + Send + 'static {
    move || {
        let outcome = reconcile_created(&table, &path);
        log_outcome(&path, &outcome);
        tally.record(path, outcome);
    }
}

/// Flag every tracked path that no longer exists as ABSENT
///
/// Works on a snapshot of the keys; returns the missing paths, sorted.
pub fn sweep_missing(table: &ChecksumTable) -> Vec<PathBuf> {
    let mut missing: Vec<PathBuf> = table
        .paths()
        .into_iter()
        .filter(|path| !path.exists())
        .collect();
    missing.sort();

    for path in &missing {
        table.set_status(path, FileStatus::Absent);
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::digest_bytes;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_verify_unknown_is_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a");
        fs::write(&path, "hello").unwrap();

        let table = ChecksumTable::new();
        assert_eq!(reconcile(&table, &path, ScanMode::Verify), Outcome::New);
        assert!(table.is_empty());
    }

    #[test]
    fn test_record_then_verify() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a");
        fs::write(&path, "hello").unwrap();
        let expected = digest_bytes(b"hello");

        let table = ChecksumTable::new();
        assert_eq!(
            reconcile(&table, &path, ScanMode::Record),
            Outcome::Recorded(expected)
        );
        assert_eq!(table.get(&path).unwrap().status, FileStatus::New);

        for _ in 0..3 {
            assert_eq!(reconcile(&table, &path, ScanMode::Verify), Outcome::Ok(expected));
        }
        assert_eq!(table.get(&path).unwrap().status, FileStatus::Ok);
        assert_eq!(table.baseline(&path), Some(expected));
    }

    #[test]
    fn test_mismatch_keeps_baseline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a");
        fs::write(&path, "hello").unwrap();

        let table = ChecksumTable::new();
        reconcile(&table, &path, ScanMode::Record);
        fs::write(&path, "changed").unwrap();

        // Record mode on a known file verifies, it does not re-baseline
        let outcome = reconcile(&table, &path, ScanMode::Record);
        assert_eq!(
            outcome,
            Outcome::Mismatch {
                expected: digest_bytes(b"hello"),
                actual: digest_bytes(b"changed"),
            }
        );

        let record = table.get(&path).unwrap();
        assert_eq!(record.baseline, digest_bytes(b"hello"));
        assert_eq!(record.last_observed, digest_bytes(b"changed"));
        assert_eq!(record.status, FileStatus::Fail);
    }

    #[test]
    fn test_created_baseline_settles_on_next_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a");
        fs::write(&path, "part").unwrap();

        let table = ChecksumTable::new();
        assert_eq!(
            reconcile_created(&table, &path),
            Outcome::Recorded(digest_bytes(b"part"))
        );

        // The writer finishes; its close-after-write record takes over
        fs::write(&path, "partial then complete").unwrap();
        let complete = digest_bytes(b"partial then complete");
        assert_eq!(
            reconcile(&table, &path, ScanMode::Record),
            Outcome::Recorded(complete)
        );
        assert_eq!(table.baseline(&path), Some(complete));

        // From here on a change is a failure like any other
        fs::write(&path, "tampered").unwrap();
        assert!(matches!(
            reconcile(&table, &path, ScanMode::Record),
            Outcome::Mismatch { .. }
        ));
        assert_eq!(table.baseline(&path), Some(complete));
    }

    #[test]
    fn test_confirmed_created_baseline_is_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a");
        fs::write(&path, "linked").unwrap();

        let table = ChecksumTable::new();
        reconcile_created(&table, &path);
        assert_eq!(
            reconcile(&table, &path, ScanMode::Verify),
            Outcome::Ok(digest_bytes(b"linked"))
        );

        fs::write(&path, "changed").unwrap();
        assert!(matches!(
            reconcile(&table, &path, ScanMode::Record),
            Outcome::Mismatch { .. }
        ));
    }

    #[test]
    fn test_unreadable_known_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a");
        fs::write(&path, "hello").unwrap();

        let table = ChecksumTable::new();
        reconcile(&table, &path, ScanMode::Record);
        fs::remove_file(&path).unwrap();

        match reconcile(&table, &path, ScanMode::Verify) {
            Outcome::Unreadable { reason } => assert!(reason.starts_with("open failed")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(table.get(&path).unwrap().status, FileStatus::Absent);
    }

    #[test]
    fn test_unreadable_unknown_file_in_record_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vanished");

        let table = ChecksumTable::new();
        assert!(matches!(
            reconcile(&table, &path, ScanMode::Record),
            Outcome::Unreadable { .. }
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_sweep_missing() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "hello").unwrap();
        fs::write(&b, "world").unwrap();

        let table = ChecksumTable::new();
        reconcile(&table, &a, ScanMode::Record);
        reconcile(&table, &b, ScanMode::Record);
        fs::remove_file(&b).unwrap();

        assert_eq!(sweep_missing(&table), vec![b.clone()]);
        assert_eq!(table.get(&b).unwrap().status, FileStatus::Absent);
        assert_eq!(table.get(&a).unwrap().status, FileStatus::New);
        // Records are never deleted
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_report_goes_to_tally() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a");
        fs::write(&path, "hello").unwrap();

        let table = ChecksumTable::new();
        let tally = Tally::new();
        reconcile_and_report(&table, &tally, path.clone(), ScanMode::Verify);

        assert!(!tally.all_ok());
        let summary = tally.summarize(ScanMode::Verify, Default::default());
        assert_eq!(summary.outcome(&path), Some(&Outcome::New));
    }
}
