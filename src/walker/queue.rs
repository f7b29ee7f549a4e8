//! Bounded task queue
//!
//! A capacity-limited FIFO of [`WorkUnit`]s shared by every producer (tree
//! walk, periodic rescans, watch events) and every worker. A push on a full
//! queue fails immediately instead of blocking the producer, and leaves the
//! queue unchanged. The rejected unit is handed back to the caller wrapped
//! in the error and releases its barrier registration when dropped.

use crate::walker::barrier::InFlight;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 100_000;

/// How a reconciliation unit treats a file it has never seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanMode {
    /// Record a baseline for unseen files (recordIfAbsent)
    Record,
    /// Never touch baselines; unseen files are reported as new (verifyOnly)
    Verify,
}

impl ScanMode {
    /// True for [`ScanMode::Record`]
    pub fn records(self) -> bool {
        matches!(self, ScanMode::Record)
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::Record => f.write_str("record"),
            ScanMode::Verify => f.write_str("verify"),
        }
    }
}

type Action = Box<dyn FnOnce() + Send + 'static>;

/// One unit of work: an action plus the path and mode it closes over
///
/// Consumed exactly once by exactly one worker.
pub struct WorkUnit {
    /// File the action operates on
    path: PathBuf,

    /// Mode the action was built for
    mode: ScanMode,

    /// The work itself
    action: Action,

    /// Barrier registration, released when the unit is dropped
    _in_flight: InFlight,
}

impl WorkUnit {
    /// Create a unit from an existing barrier registration
    pub fn new<F>(path: PathBuf, mode: ScanMode, in_flight: InFlight, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            path,
            mode,
            action: Box::new(action),
            _in_flight: in_flight,
        }
    }

    /// Path this unit was created for
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode this unit was created for
    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Run the action, then release the registration
    pub fn run(self) {
        let WorkUnit {
            action, _in_flight, ..
        } = self;
        action();
        drop(_in_flight);
    }
}

impl fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkUnit")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Statistics for the task queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total units accepted
    pub enqueued: AtomicU64,

    /// Total units handed to workers
    pub dequeued: AtomicU64,

    /// Units rejected because the queue was full
    pub rejected: AtomicU64,
}

impl QueueStats {
    /// Units accepted so far
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Units handed out so far
    pub fn dequeued(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    /// Rejections so far
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Bounded FIFO of work units
#[derive(Clone)]
pub struct TaskQueue {
    sender: Sender<WorkUnit>,
    receiver: Receiver<WorkUnit>,
    capacity: usize,
    stats: Arc<QueueStats>,
}

impl TaskQueue {
    /// Create a queue holding at most `capacity` units (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);

        Self {
            sender,
            receiver,
            capacity,
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Append a unit
    ///
    /// Returns the unit back if the queue is full. Never blocks.
    pub fn try_push(&self, unit: WorkUnit) -> Result<(), WorkUnit> {
        match self.sender.try_send(unit) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            // Both ends live in `self`, so Disconnected cannot happen
            Err(TrySendError::Full(unit)) | Err(TrySendError::Disconnected(unit)) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                Err(unit)
            }
        }
    }

    /// Append a unit; false if the queue was full
    ///
    /// A rejected unit is dropped here, releasing its barrier registration.
    pub fn push(&self, unit: WorkUnit) -> bool {
        self.try_push(unit).is_ok()
    }

    /// Take the oldest unit without blocking
    pub fn pop(&self) -> Option<WorkUnit> {
        match self.receiver.try_recv() {
            Ok(unit) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(unit)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Receiving end for workers that block on the queue
    pub(crate) fn receiver(&self) -> &Receiver<WorkUnit> {
        &self.receiver
    }

    pub(crate) fn record_dequeue(&self) {
        self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
    }

    /// Units currently queued
    pub fn size(&self) -> usize {
        self.receiver.len()
    }

    /// True if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Maximum number of queued units
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("size", &self.size())
            .field("capacity", &self.capacity)
            .finish()
    }
}
