//! Single submission path into the worker pool
//!
//! Every producer (tree walk, periodic rescan, watch events, explicit
//! checks) goes through [`Dispatcher::submit`]. It registers the unit on the
//! quiescence barrier, hands it to the pool and, on rejection, drops the
//! unit so the registration is released right away. Nothing else touches
//! the barrier, so registrations and releases cannot get out of step.

use crate::error::{SubmitError, WorkerError};
use crate::walker::barrier::Quiescence;
use crate::walker::pool::WorkerPool;
use crate::walker::queue::{ScanMode, WorkUnit};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Worker pool plus the barrier its units register on
pub struct Dispatcher {
    pool: WorkerPool,
    barrier: Arc<Quiescence>,
}

impl Dispatcher {
    /// Start a pool of `workers` over a queue of `queue_capacity`
    pub fn new(workers: usize, queue_capacity: usize) -> Result<Self, WorkerError> {
        Ok(Self {
            pool: WorkerPool::new(workers, queue_capacity)?,
            barrier: Quiescence::new(),
        })
    }

    /// Register and queue one unit of work
    pub fn submit<F>(&self, path: PathBuf, mode: ScanMode, action: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        let unit = WorkUnit::new(path, mode, self.barrier.enter(), action);

        match self.pool.try_submit(unit) {
            Ok(()) => Ok(()),
            Err(unit) => {
                let path = unit.path().to_path_buf();
                drop(unit);
                if self.pool.is_stopped() {
                    Err(SubmitError::Stopped { path })
                } else {
                    Err(SubmitError::QueueFull { path })
                }
            }
        }
    }

    /// Block until every submitted unit has finished
    pub fn quiesce(&self) {
        self.barrier.wait();
    }

    /// Bounded [`quiesce`](Self::quiesce); true if drained in time
    pub fn quiesce_timeout(&self, timeout: Duration) -> bool {
        self.barrier.wait_timeout(timeout)
    }

    /// Units registered and not yet finished
    pub fn in_flight(&self) -> i64 {
        self.barrier.pending()
    }

    /// The underlying pool
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Stop the pool; see [`WorkerPool::shutdown`]
    pub fn shutdown(&self) -> usize {
        self.pool.shutdown()
    }
}
