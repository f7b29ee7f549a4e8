//! crc-monitor - File-Integrity Monitoring Daemon
//!
//! Computes a CRC-32 for every regular file under one directory tree,
//! remembers the values as baselines and re-verifies them on every trigger:
//! the initial recording scan, a periodic timer, live change notifications
//! and an on-demand rescan signal.
//!
//! # Features
//!
//! - **Bounded Work Queue**: every trigger submits into one capacity-limited
//!   queue; a full queue rejects instead of blocking the producer.
//!
//! - **Parallel Checksums**: a fixed pool of worker threads streams files
//!   through CRC-32 in 16 KiB chunks.
//!
//! - **Quiescence Barrier**: a scan waits for exactly the units it and the
//!   other producers registered, and then reports one verdict.
//!
//! - **Live Watching**: per-directory inotify watches record files on
//!   creation and close-after-write and pick up new subdirectories.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Watched Directory Tree                      │
//! └───────────┬────────────────────────┬────────────────────────────┘
//!             │ walkdir                │ inotify (notify)
//!             ▼                        ▼
//! ┌─────────────────────┐   ┌─────────────────────┐   ┌─────────────┐
//! │  Monitor::scan      │   │  crc-watch thread   │   │  periodic / │
//! │  (record / verify)  │   │  (single files)     │   │  SIGUSR1    │
//! └──────────┬──────────┘   └──────────┬──────────┘   └──────┬──────┘
//!            └─────────────────────────┼─────────────────────┘
//!                                      ▼
//!                        ┌──────────────────────────┐
//!                        │     Work Queue           │
//!                        │  (crossbeam bounded)     │
//!                        │  - Backpressure support  │
//!                        └────────────┬─────────────┘
//!                                     ▼
//!    ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐
//!    │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker N │
//!    │ CRC-32  │  │ CRC-32  │  │ CRC-32  │         │ CRC-32  │
//!    └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘
//!         └────────────┴─────┬──────┴────────────────────┘
//!                            ▼
//!                ┌──────────────────────────┐
//!                │   ChecksumTable          │──► JSON snapshot
//!                │   (RwLock, per-file)     │
//!                └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Monitor /etc, verify every five minutes
//! crc-monitor -D /etc -P 300
//!
//! # Directory from the environment, force a verification pass
//! CRC_SCAN_DIRECTORY=/srv/data crc-monitor &
//! kill -USR1 $!
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod periodic;
pub mod store;
pub mod triggers;
pub mod walker;
pub mod watch;

pub use config::{CliArgs, MonitorConfig};
pub use error::{MonitorError, Result};
pub use triggers::Triggers;
pub use walker::{Monitor, ScanMode, ScanPhase, ScanSummary};
