//! Scan engine
//!
//! This module implements the concurrent reconciliation of the watched
//! tree against the checksum table.
//!
//! # Architecture
//!
//! ```text
//!   tree walk ──┐
//!   timer ──────┼──► Dispatcher::submit ──► TaskQueue (bounded) ──► WorkerPool
//!   watcher ────┘          │                                          │
//!                          │ enter()                  reconcile + log │
//!                          ▼                                          ▼
//!                     Quiescence ◄──────────── drop(InFlight) ── ChecksumTable
//! ```

pub mod barrier;
pub mod coordinator;
pub mod discover;
pub mod dispatch;
pub mod pool;
pub mod queue;
pub mod reconcile;
pub mod report;

pub use barrier::{InFlight, Quiescence};
pub use coordinator::{Monitor, ScanPhase};
pub use discover::{discover, Discovery};
pub use dispatch::Dispatcher;
pub use pool::WorkerPool;
pub use queue::{ScanMode, TaskQueue, WorkUnit, DEFAULT_QUEUE_CAPACITY};
pub use reconcile::{reconcile, sweep_missing};
pub use report::{FileReport, Outcome, ScanSummary, Tally};
