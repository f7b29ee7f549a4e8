//! Worker pool draining the bounded task queue
//!
//! Each worker:
//! - Blocks until a unit is queued or shutdown is requested
//! - Executes one unit at a time, catching panics so a bad unit never
//!   takes its worker down
//! - Returns as soon as it observes shutdown, without draining the queue
//!
//! Shutdown is cooperative: the stop flag is set and the shutdown channel
//! is closed, which wakes every blocked worker at once. Submitters check
//! the flag and push under a shared gate that shutdown takes exclusively,
//! so no unit can slip into the queue after it has been drained. Units that are
//! already executing run to completion; units still queued are dropped,
//! which releases their barrier registrations. There is no per-unit
//! timeout, so a hung read occupies its worker until it returns.

use crate::error::WorkerError;
use crate::walker::queue::{TaskQueue, WorkUnit};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

/// Maximum reasonable worker count
pub const MAX_WORKERS: usize = 512;

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Units executed (including ones that panicked)
    pub units_run: AtomicU64,

    /// Units that panicked
    pub panics: AtomicU64,
}

impl WorkerStats {
    fn record_run(&self) {
        self.units_run.fetch_add(1, Ordering::Relaxed);
    }

    fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }
}

/// A worker thread that executes queued units
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<()>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    fn spawn(
        id: usize,
        queue: TaskQueue,
        stop: Arc<AtomicBool>,
        shutdown_rx: Receiver<()>,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);
        let name = format!("crc-worker-{}", id);

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(id, queue, stop, shutdown_rx, stats_clone))
            .map_err(|e| WorkerError::InitFailed {
                name,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Wait for the worker to finish
    fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked {
                name: format!("crc-worker-{}", self.id),
            }),
            None => Ok(()),
        }
    }
}

/// Main worker loop
fn worker_loop(
    id: usize,
    queue: TaskQueue,
    stop: Arc<AtomicBool>,
    shutdown_rx: Receiver<()>,
    stats: Arc<WorkerStats>,
) {
    debug!(worker = id, "Worker starting");

    loop {
        select! {
            recv(shutdown_rx) -> _ => break,
            recv(queue.receiver()) -> msg => {
                let Ok(unit) = msg else { break };

                // Shutdown raced with a ready unit: leave it undone
                if stop.load(Ordering::SeqCst) {
                    drop(unit);
                    break;
                }

                queue.record_dequeue();
                execute(id, unit, &stats);
            }
        }
    }

    debug!(
        worker = id,
        units = stats.units_run.load(Ordering::Relaxed),
        "Worker shutting down"
    );
}

fn execute(id: usize, unit: WorkUnit, stats: &WorkerStats) {
    let path = unit.path().to_path_buf();
    trace!(worker = id, path = %path.display(), mode = %unit.mode(), "Running unit");

    stats.record_run();
    if panic::catch_unwind(AssertUnwindSafe(|| unit.run())).is_err() {
        stats.record_panic();
        error!(worker = id, path = %path.display(), "Work unit panicked");
    }
}

/// Fixed set of workers sharing one bounded queue
pub struct WorkerPool {
    queue: TaskQueue,
    workers: Mutex<Vec<Worker>>,
    stop: Arc<AtomicBool>,
    submit_gate: RwLock<()>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
}

impl WorkerPool {
    /// Start `worker_count` workers over a queue of `queue_capacity`
    pub fn new(worker_count: usize, queue_capacity: usize) -> Result<Self, WorkerError> {
        let worker_count = worker_count.clamp(1, MAX_WORKERS);
        let queue = TaskQueue::new(queue_capacity);
        let stop = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let pool = Self {
            queue,
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            stop,
            submit_gate: RwLock::new(()),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
        };

        for id in 0..worker_count {
            let worker = Worker::spawn(
                id,
                pool.queue.clone(),
                Arc::clone(&pool.stop),
                shutdown_rx.clone(),
            );

            match worker {
                Ok(worker) => pool.workers.lock().push(worker),
                Err(e) => {
                    // Dropping `pool` stops the workers spawned so far
                    error!(error = %e, "Failed to start worker pool");
                    return Err(e);
                }
            }
        }

        info!(
            workers = worker_count,
            capacity = pool.queue.capacity(),
            "Worker pool started"
        );
        Ok(pool)
    }

    /// Queue a unit; false if rejected
    ///
    /// The caller owns the retry policy. A rejected unit is dropped.
    pub fn submit(&self, unit: WorkUnit) -> bool {
        self.try_submit(unit).is_ok()
    }

    /// Queue a unit, handing it back on rejection
    pub fn try_submit(&self, unit: WorkUnit) -> Result<(), WorkUnit> {
        let _gate = self.submit_gate.read();
        if self.stop.load(Ordering::SeqCst) {
            return Err(unit);
        }
        self.queue.try_push(unit)
    }

    /// True once shutdown has started
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Units executed across all workers
    pub fn units_run(&self) -> u64 {
        self.workers
            .lock()
            .iter()
            .map(|w| w.stats().units_run.load(Ordering::Relaxed))
            .sum()
    }

    /// Stop all workers and join them
    ///
    /// Idempotent. Returns the number of queued units that were discarded.
    pub fn shutdown(&self) -> usize {
        // Waits out any push that already passed the stop check
        {
            let _gate = self.submit_gate.write();
            self.stop.store(true, Ordering::SeqCst);
        }

        // Closing the channel wakes every worker blocked in select!
        drop(self.shutdown_tx.lock().take());

        let workers = std::mem::take(&mut *self.workers.lock());
        let joined = workers.len();
        for worker in workers {
            if let Err(e) = worker.join() {
                warn!(error = %e, "Worker failed to join cleanly");
            }
        }

        let mut discarded = 0;
        while let Some(unit) = self.queue.pop() {
            drop(unit);
            discarded += 1;
        }

        if joined > 0 {
            info!(workers = joined, discarded, "Worker pool stopped");
        }
        discarded
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::barrier::Quiescence;
    use crate::walker::queue::ScanMode;
    use std::path::PathBuf;
    use std::time::Duration;

    fn counting_unit(barrier: &Arc<Quiescence>, hits: &Arc<AtomicU64>) -> WorkUnit {
        let hits = Arc::clone(hits);
        WorkUnit::new(PathBuf::from("/x"), ScanMode::Verify, barrier.enter(), move || {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_pool_runs_every_accepted_unit() {
        let pool = WorkerPool::new(4, 1000).unwrap();
        let barrier = Quiescence::new();
        let hits = Arc::new(AtomicU64::new(0));

        let accepted = (0..500)
            .filter(|_| pool.submit(counting_unit(&barrier, &hits)))
            .count();

        barrier.wait();
        assert_eq!(accepted, 500);
        assert_eq!(hits.load(Ordering::SeqCst), 500);
        assert_eq!(barrier.pending(), 0);
        assert_eq!(pool.units_run(), 500);
    }

    #[test]
    fn test_panicking_unit_keeps_worker_alive() {
        let pool = WorkerPool::new(1, 10).unwrap();
        let barrier = Quiescence::new();
        let hits = Arc::new(AtomicU64::new(0));

        let bad = WorkUnit::new(PathBuf::from("/bad"), ScanMode::Verify, barrier.enter(), || {
            panic!("broken unit");
        });
        assert!(pool.submit(bad));
        assert!(pool.submit(counting_unit(&barrier, &hits)));

        barrier.wait();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_releases_queued_units() {
        let pool = WorkerPool::new(1, 10).unwrap();
        let barrier = Quiescence::new();
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let (started_tx, started_rx) = bounded::<()>(1);

        // Occupy the only worker
        let blocker = WorkUnit::new(PathBuf::from("/gate"), ScanMode::Verify, barrier.enter(), move || {
            started_tx.send(()).ok();
            gate_rx.recv().ok();
        });
        assert!(pool.submit(blocker));
        started_rx.recv().unwrap();

        let hits = Arc::new(AtomicU64::new(0));
        for _ in 0..3 {
            assert!(pool.submit(counting_unit(&barrier, &hits)));
        }
        assert_eq!(barrier.pending(), 4);

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(gate_tx);
        });
        let discarded = pool.shutdown();
        releaser.join().unwrap();

        // The in-flight unit finished; queued ones were dropped, not run
        assert_eq!(barrier.pending(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(discarded <= 3);
        assert!(!pool.submit(counting_unit(&barrier, &hits)));
        assert_eq!(barrier.pending(), 0);
    }

    #[test]
    fn test_no_unit_left_behind_by_concurrent_shutdown() {
        for _ in 0..20 {
            let pool = Arc::new(WorkerPool::new(2, 64).unwrap());
            let barrier = Quiescence::new();
            let hits = Arc::new(AtomicU64::new(0));

            let producers: Vec<_> = (0..4)
                .map(|_| {
                    let pool = Arc::clone(&pool);
                    let barrier = Arc::clone(&barrier);
                    let hits = Arc::clone(&hits);
                    thread::spawn(move || {
                        for _ in 0..500 {
                            pool.submit(counting_unit(&barrier, &hits));
                        }
                    })
                })
                .collect();

            thread::sleep(Duration::from_millis(1));
            pool.shutdown();
            for producer in producers {
                producer.join().unwrap();
            }

            // Every registration was either run, discarded or rejected
            assert!(barrier.wait_timeout(Duration::from_secs(5)));
            assert_eq!(barrier.pending(), 0);
        }
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool = WorkerPool::new(2, 10).unwrap();
        pool.shutdown();
        assert_eq!(pool.shutdown(), 0);
        assert!(pool.is_stopped());
    }
}
