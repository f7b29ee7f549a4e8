//! Checksum storage
//!
//! - [`table`]: the concurrent in-memory path -> checksum map
//! - [`snapshot`]: flat JSON export of the table

pub mod snapshot;
pub mod table;

pub use snapshot::{write_snapshot, Snapshot, SnapshotEntry};
pub use table::{ChecksumRecord, ChecksumTable, FileStatus, Insert};
