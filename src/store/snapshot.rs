//! JSON snapshot of the checksum table
//!
//! The snapshot is a flat, write-only report:
//!
//! ```json
//! {
//!   "generated_at": "2026-10-14T09:00:00+00:00",
//!   "root": "/srv/data",
//!   "entries": [
//!     { "path": "/srv/data/a", "etalon": "3610a686", "result": "3610a686", "status": "OK" }
//!   ]
//! }
//! ```
//!
//! Files are written to a temporary sibling and renamed into place so a
//! reader never sees a half-written snapshot.

use crate::content::Crc32;
use crate::error::SnapshotError;
use crate::store::table::{ChecksumTable, FileStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// One row of the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub path: PathBuf,
    pub etalon: Crc32,
    pub result: Crc32,
    pub status: FileStatus,
}

/// Whole snapshot document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub root: PathBuf,
    pub entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    /// Capture the current table contents
    pub fn capture(root: &Path, table: &ChecksumTable) -> Self {
        let entries = table
            .records()
            .into_iter()
            .map(|(path, record)| SnapshotEntry {
                path,
                etalon: record.baseline,
                result: record.last_observed,
                status: record.status,
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            root: root.to_path_buf(),
            entries,
        }
    }
}

/// Capture `table` and write it to `path`
pub fn write_snapshot(path: &Path, root: &Path, table: &ChecksumTable) -> Result<usize, SnapshotError> {
    let snapshot = Snapshot::capture(root, table);
    let json = serde_json::to_vec_pretty(&snapshot)?;

    let tmp = tmp_path(path);
    let io_err = |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };

    {
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.write_all(b"\n").map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    fs::rename(&tmp, path).map_err(io_err)?;

    info!(
        path = %path.display(),
        entries = snapshot.entries.len(),
        "Snapshot written"
    );

    Ok(snapshot.entries.len())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_snapshot_file_layout() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("crc.json");

        let table = ChecksumTable::new();
        table.insert_if_absent(PathBuf::from("/w/b"), Crc32(0x22));
        table.insert_if_absent(PathBuf::from("/w/a"), Crc32(0x11));
        table.observe(Path::new("/w/a"), Crc32(0x99), FileStatus::Fail);

        let written = write_snapshot(&out, Path::new("/w"), &table).unwrap();
        assert_eq!(written, 2);
        assert!(!tmp_path(&out).exists());

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(&out).unwrap()).unwrap();
        let entries = value["entries"].as_array().unwrap();

        assert_eq!(entries[0]["path"], "/w/a");
        assert_eq!(entries[0]["etalon"], "00000011");
        assert_eq!(entries[0]["result"], "00000099");
        assert_eq!(entries[0]["status"], "FAIL");
        assert_eq!(entries[1]["status"], "NEW");
        assert_eq!(value["root"], "/w");
    }

    #[test]
    fn test_snapshot_into_missing_dir_fails() {
        let table = ChecksumTable::new();
        let err = write_snapshot(
            Path::new("/nonexistent/crc-monitor/snap.json"),
            Path::new("/w"),
            &table,
        )
        .unwrap_err();
        assert!(matches!(err, SnapshotError::Io { .. }));
    }
}
