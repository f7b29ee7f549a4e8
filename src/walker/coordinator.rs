//! Scan coordinator - orchestrates integrity checks over the watched tree
//!
//! The coordinator is responsible for:
//! - Setting up the checksum table, worker pool and directory watches
//! - Running scan cycles (record or verify) and reporting their verdict
//! - Turning watch events into single-file reconciliation units
//! - Snapshots, explicit re-baselining and shutdown
//!
//! Every producer funnels through [`Monitor::submit`], so units from the
//! initial walk, the timer, the watcher and explicit checks share one
//! bounded queue and one quiescence barrier.
//!
//! ```text
//!   Idle ──► Walking ──► AwaitingQuiescence ──► Reported ──► Idle
//!              │                 │
//!       discover + submit    barrier wait (+ existence sweep in verify)
//! ```

use crate::config::MonitorConfig;
use crate::content::{digest_file, Crc32};
use crate::error::{Result, SubmitError, WorkerError};
use crate::store::{self, ChecksumTable, FileStatus, Insert};
use crate::walker::discover::{discover, is_excluded, Discovery};
use crate::walker::dispatch::Dispatcher;
use crate::walker::queue::ScanMode;
use crate::walker::reconcile::{created_unit, reconcile_unit, sweep_missing};
use crate::walker::report::{log_outcome, Outcome, ScanSummary, Tally};
use crate::watch::{DirWatcher, WatchEvent, WatchEventKind};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Where a scan cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScanPhase {
    /// No cycle running
    Idle = 0,
    /// Discovering files and submitting units
    Walking = 1,
    /// Waiting for submitted units to finish
    AwaitingQuiescence = 2,
    /// Summarizing
    Reported = 3,
}

impl ScanPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ScanPhase::Walking,
            2 => ScanPhase::AwaitingQuiescence,
            3 => ScanPhase::Reported,
            _ => ScanPhase::Idle,
        }
    }
}

/// State shared with the watch dispatch thread
struct Inner {
    /// Configuration
    config: MonitorConfig,

    /// Baselines and last results
    table: Arc<ChecksumTable>,

    /// Pool plus barrier
    dispatcher: Dispatcher,

    /// OS watches
    watcher: Mutex<DirWatcher>,

    /// Serializes scan cycles
    scan_lock: Mutex<()>,

    /// Current [`ScanPhase`]
    phase: AtomicU8,

    /// Cycles that reached `Reported`
    cycles: AtomicU64,
}

/// Background thread draining watch events
struct WatchThread {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Integrity monitor for one directory tree
pub struct Monitor {
    inner: Arc<Inner>,

    /// Classified events from the watcher
    events: Receiver<WatchEvent>,

    /// Watch dispatch thread, once started
    watch_thread: Mutex<Option<WatchThread>>,

    /// Set by the first shutdown
    stopped: AtomicBool,
}

impl Monitor {
    /// Create a monitor and put a watch on the root directory
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let table = Arc::new(ChecksumTable::new());
        let dispatcher = Dispatcher::new(config.worker_count, config.queue_size)?;

        let (events_tx, events) = unbounded();
        let mut watcher = DirWatcher::new(events_tx)?;
        watcher.watch(&config.root)?;

        info!(
            root = %config.root.display(),
            workers = config.worker_count,
            queue = config.queue_size,
            "Monitor initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                table,
                dispatcher,
                watcher: Mutex::new(watcher),
                scan_lock: Mutex::new(()),
                phase: AtomicU8::new(ScanPhase::Idle as u8),
                cycles: AtomicU64::new(0),
            }),
            events,
            watch_thread: Mutex::new(None),
            stopped: AtomicBool::new(false),
        })
    }

    /// Run one full cycle over the tree
    ///
    /// `Record` baselines files it has not seen and registers watches on
    /// every directory; `Verify` never adds baselines and finishes with an
    /// existence sweep. Cycles never overlap.
    pub fn scan(&self, mode: ScanMode) -> ScanSummary {
        self.inner.scan(mode)
    }

    /// Sweep for missing files, then verify every known path
    pub fn check_known(&self) -> ScanSummary {
        self.inner.check_known()
    }

    /// Queue one reconciliation unit for `path`, reporting into `tally`
    pub fn submit(&self, path: PathBuf, mode: ScanMode, tally: &Arc<Tally>) -> std::result::Result<(), SubmitError> {
        self.inner.submit(path, mode, tally)
    }

    /// Start the `crc-watch` thread that acts on watch events
    ///
    /// Calling it again while running does nothing.
    pub fn start_watching(&self) -> Result<()> {
        let mut slot = self.watch_thread.lock();
        if slot.is_some() || self.stopped.load(Ordering::Acquire) {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();

        let handle = thread::Builder::new()
            .name("crc-watch".to_string())
            .spawn(move || watch_loop(inner, events, shutdown_rx))
            .map_err(|e| WorkerError::InitFailed {
                name: "crc-watch".to_string(),
                reason: e.to_string(),
            })?;

        info!(dirs = self.inner.watcher.lock().len(), "Watching for changes");
        *slot = Some(WatchThread {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Act on one watch event as the dispatch thread would
    pub fn handle_watch_event(&self, event: WatchEvent) {
        self.inner.handle_watch_event(event);
    }

    /// Block until every submitted unit has finished
    pub fn quiesce(&self) {
        self.inner.dispatcher.quiesce();
    }

    /// Re-digest `path` and make the result its baseline
    ///
    /// Returns the replaced baseline, or `None` if the file was not tracked
    /// yet (it is tracked afterwards).
    pub fn accept_baseline(&self, path: &Path) -> Result<Option<Crc32>> {
        let digest = digest_file(path)?;
        let table = &self.inner.table;

        let previous = match table.rebaseline(path, digest) {
            Some(previous) => Some(previous),
            None => match table.insert_if_absent(path.to_path_buf(), digest) {
                Insert::Inserted => None,
                // Inserted concurrently; ours is the newer read
                Insert::Existing(_) => table.rebaseline(path, digest),
            },
        };

        info!(
            path = %path.display(),
            baseline = %digest,
            previous = ?previous.map(|c| c.to_string()),
            "Baseline accepted"
        );
        Ok(previous)
    }

    /// Write a JSON snapshot of the table to `path`
    pub fn write_snapshot(&self, path: &Path) -> Result<usize> {
        Ok(store::write_snapshot(path, &self.inner.config.root, &self.inner.table)?)
    }

    /// Current phase of the running cycle
    pub fn phase(&self) -> ScanPhase {
        ScanPhase::from_u8(self.inner.phase.load(Ordering::Acquire))
    }

    /// Number of scan cycles finished so far
    pub fn cycles_completed(&self) -> u64 {
        self.inner.cycles.load(Ordering::Acquire)
    }

    /// The checksum table
    pub fn table(&self) -> &Arc<ChecksumTable> {
        &self.inner.table
    }

    /// The pool and barrier
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Configuration in effect
    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Directories currently holding a watch, sorted
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.inner.watcher.lock().watched()
    }

    /// True once [`shutdown`](Self::shutdown) has been called
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop the watch thread, the watches and the worker pool
    ///
    /// Units already running finish; queued ones are dropped. Idempotent.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(thread) = self.watch_thread.lock().take() {
            drop(thread.shutdown_tx);
            if thread.handle.join().is_err() {
                warn!("Watch thread panicked");
            }
        }

        let root = self.inner.config.root.clone();
        self.inner.watcher.lock().unwatch(&root);

        let discarded = self.inner.dispatcher.shutdown();
        info!(discarded, "Monitor stopped");
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watch_loop(inner: Arc<Inner>, events: Receiver<WatchEvent>, shutdown_rx: Receiver<()>) {
    debug!("Watch thread starting");
    loop {
        select! {
            recv(shutdown_rx) -> _ => break,
            recv(events) -> msg => match msg {
                Ok(event) => inner.handle_watch_event(event),
                Err(_) => break,
            },
        }
    }
    debug!("Watch thread exiting");
}

impl Inner {
    fn set_phase(&self, phase: ScanPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn scan(&self, mode: ScanMode) -> ScanSummary {
        let _cycle = self.scan_lock.lock();
        let started = Instant::now();
        let tally = Arc::new(Tally::new());

        self.set_phase(ScanPhase::Walking);
        debug!(mode = %mode, root = %self.config.root.display(), "Scan started");

        let found = discover(&self.config.root, &self.config.exclude_patterns);
        self.report_discovery_errors(&found, &tally);

        if mode.records() {
            for dir in &found.dirs {
                self.register_watch(dir);
            }
        }

        for file in found.files {
            // Rejections are logged and tallied by submit
            let _ = self.submit(file, mode, &tally);
        }

        self.set_phase(ScanPhase::AwaitingQuiescence);
        self.dispatcher.quiesce();

        if !mode.records() {
            self.report_missing(&tally);
        }

        self.finish_cycle(mode, &tally, started)
    }

    fn check_known(&self) -> ScanSummary {
        let _cycle = self.scan_lock.lock();
        let started = Instant::now();
        let tally = Arc::new(Tally::new());

        self.set_phase(ScanPhase::Walking);
        self.report_missing(&tally);

        let mut known = self.table.paths();
        known.sort();
        for path in known {
            let _ = self.submit(path, ScanMode::Verify, &tally);
        }

        self.set_phase(ScanPhase::AwaitingQuiescence);
        self.dispatcher.quiesce();

        self.finish_cycle(ScanMode::Verify, &tally, started)
    }

    fn finish_cycle(&self, mode: ScanMode, tally: &Tally, started: Instant) -> ScanSummary {
        self.set_phase(ScanPhase::Reported);
        let summary = tally.summarize(mode, started.elapsed());

        if summary.all_ok() {
            info!(
                mode = %mode,
                files = summary.checked(),
                duration_ms = summary.duration.as_millis() as u64,
                "Integrity check: OK"
            );
        } else {
            warn!(
                mode = %mode,
                files = summary.checked(),
                new = summary.new,
                mismatched = summary.mismatched,
                unreadable = summary.unreadable,
                removed = summary.removed,
                rejected = summary.rejected,
                duration_ms = summary.duration.as_millis() as u64,
                "Scan finished with failures"
            );
        }

        self.set_phase(ScanPhase::Idle);
        self.cycles.fetch_add(1, Ordering::AcqRel);
        summary
    }

    fn submit(&self, path: PathBuf, mode: ScanMode, tally: &Arc<Tally>) -> std::result::Result<(), SubmitError> {
        let action = reconcile_unit(Arc::clone(&self.table), Arc::clone(tally), path.clone(), mode);
        self.submit_action(path, mode, tally, action)
    }

    fn submit_action<F>(
        &self,
        path: PathBuf,
        mode: ScanMode,
        tally: &Tally,
        action: F,
    ) -> std::result::Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatcher.submit(path, mode, action).map_err(|e| {
            match &e {
                SubmitError::QueueFull { path } => {
                    error!(path = %path.display(), "ThreadPool queue is full");
                    tally.reject(path.clone());
                }
                SubmitError::Stopped { path } => {
                    debug!(path = %path.display(), "Submission after shutdown");
                    tally.reject(path.clone());
                }
            }
            e
        })
    }

    fn report_discovery_errors(&self, found: &Discovery, tally: &Tally) {
        for (path, reason) in &found.errors {
            let outcome = Outcome::Unreadable {
                reason: reason.clone(),
            };
            log_outcome(path, &outcome);
            tally.record(path.clone(), outcome);
        }
    }

    fn report_missing(&self, tally: &Tally) {
        for path in sweep_missing(&self.table) {
            let outcome = Outcome::Removed;
            log_outcome(&path, &outcome);
            tally.record(path, outcome);
        }
    }

    fn register_watch(&self, dir: &Path) {
        if self.dispatcher.pool().is_stopped() {
            return;
        }
        if let Err(e) = self.watcher.lock().watch(dir) {
            error!("{}", e);
        }
    }

    fn handle_watch_event(&self, event: WatchEvent) {
        let WatchEvent { path, kind } = event;
        if is_excluded(&path, &self.config.exclude_patterns) {
            return;
        }

        match kind {
            WatchEventKind::Created => {
                // An empty new file is recorded on close-after-write instead
                if !has_content(&path) {
                    debug!(path = %path.display(), "File created");
                    return;
                }
                debug!(path = %path.display(), "File created with content");
                let tally = Arc::new(Tally::new());
                let action = created_unit(Arc::clone(&self.table), Arc::clone(&tally), path.clone());
                let _ = self.submit_action(path, ScanMode::Record, &tally, action);
            }
            WatchEventKind::Modified | WatchEventKind::MovedIn => {
                debug!(path = %path.display(), kind = ?kind, "File changed");
                let _ = self.submit(path, ScanMode::Record, &Arc::new(Tally::new()));
            }
            WatchEventKind::DirCreated => self.track_new_dir(&path),
            WatchEventKind::Removed => {
                // A rename away gives no type; a registered watch means it was a directory
                if self.watcher.lock().is_watched(&path) {
                    self.forget_dir(&path);
                } else {
                    error!("Integrity check: FAIL ({} - the file was removed)", path.display());
                    self.table.set_status(&path, FileStatus::Absent);
                }
            }
            WatchEventKind::DirRemoved => self.forget_dir(&path),
        }
    }

    /// Watch a new directory and record whatever landed in it before the watch
    fn track_new_dir(&self, dir: &Path) {
        debug!(dir = %dir.display(), "Directory created");
        let found = discover(dir, &self.config.exclude_patterns);
        let tally = Arc::new(Tally::new());

        for sub in &found.dirs {
            self.register_watch(sub);
        }
        self.report_discovery_errors(&found, &tally);

        for file in found.files {
            let _ = self.submit(file, ScanMode::Record, &tally);
        }
    }

    fn forget_dir(&self, dir: &Path) {
        error!("Integrity check: FAIL ({} - the directory was removed)", dir.display());
        self.watcher.lock().unwatch(dir);

        for path in self.table.paths() {
            if path.starts_with(dir) {
                self.table.set_status(&path, FileStatus::Absent);
            }
        }
    }
}

/// Regular file that already holds data or is another name for an existing inode
fn has_content(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(meta) => meta.is_file() && (meta.len() > 0 || meta.nlink() > 1),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::digest_bytes;
    use std::fs;
    use tempfile::tempdir;

    fn monitor(root: &Path) -> Monitor {
        let config = MonitorConfig::new(root).unwrap().with_workers(2).unwrap();
        Monitor::new(config).unwrap()
    }

    #[test]
    fn test_record_then_verify_cycle() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a"), "hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b"), "world").unwrap();

        let monitor = monitor(dir.path());
        let recorded = monitor.scan(ScanMode::Record);
        assert_eq!(recorded.recorded, 2);
        assert!(recorded.all_ok());
        assert_eq!(monitor.watched_dirs().len(), 2);
        assert_eq!(monitor.phase(), ScanPhase::Idle);

        let verified = monitor.scan(ScanMode::Verify);
        assert_eq!(verified.ok, 2);
        assert!(verified.all_ok());
    }

    #[test]
    fn test_verify_scan_does_not_watch() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let monitor = monitor(dir.path());
        monitor.scan(ScanMode::Verify);
        assert_eq!(monitor.watched_dirs(), vec![monitor.config().root.clone()]);
    }

    #[test]
    fn test_accept_baseline() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let a = root.join("a");
        fs::write(&a, "hello").unwrap();

        let monitor = monitor(&root);
        monitor.scan(ScanMode::Record);
        fs::write(&a, "changed").unwrap();
        assert_eq!(monitor.scan(ScanMode::Verify).mismatched, 1);

        let previous = monitor.accept_baseline(&a).unwrap();
        assert_eq!(previous, Some(digest_bytes(b"hello")));
        assert_eq!(monitor.table().baseline(&a), Some(digest_bytes(b"changed")));
        assert!(monitor.scan(ScanMode::Verify).all_ok());

        // Untracked files become tracked
        let b = root.join("b");
        fs::write(&b, "new").unwrap();
        assert_eq!(monitor.accept_baseline(&b).unwrap(), None);
        assert_eq!(monitor.table().baseline(&b), Some(digest_bytes(b"new")));
    }

    #[test]
    fn test_removed_file_event() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let a = root.join("a");
        fs::write(&a, "hello").unwrap();

        let monitor = monitor(&root);
        monitor.scan(ScanMode::Record);
        fs::remove_file(&a).unwrap();

        monitor.handle_watch_event(WatchEvent::new(a.clone(), WatchEventKind::Removed));
        assert_eq!(monitor.table().get(&a).unwrap().status, FileStatus::Absent);
    }

    #[test]
    fn test_removed_dir_event() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let sub = root.join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("b"), "world").unwrap();

        let monitor = monitor(&root);
        monitor.scan(ScanMode::Record);
        assert!(monitor.watched_dirs().contains(&sub));

        fs::remove_dir_all(&sub).unwrap();
        // Rename-away style event with no type information
        monitor.handle_watch_event(WatchEvent::new(sub.clone(), WatchEventKind::Removed));

        assert!(!monitor.watched_dirs().contains(&sub));
        assert_eq!(
            monitor.table().get(&sub.join("b")).unwrap().status,
            FileStatus::Absent
        );
    }

    #[test]
    fn test_empty_created_file_waits_for_close() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let monitor = monitor(&root);

        let c = root.join("c");
        fs::write(&c, "").unwrap();
        monitor.handle_watch_event(WatchEvent::new(c.clone(), WatchEventKind::Created));
        monitor.quiesce();
        assert!(monitor.table().get(&c).is_none());

        fs::write(&c, "content").unwrap();
        monitor.handle_watch_event(WatchEvent::new(c.clone(), WatchEventKind::Modified));
        monitor.quiesce();
        assert_eq!(monitor.table().baseline(&c), Some(digest_bytes(b"content")));
    }

    #[test]
    fn test_created_file_with_content_is_recorded() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let monitor = monitor(&root);

        let c = root.join("c");
        fs::write(&c, "early").unwrap();
        monitor.handle_watch_event(WatchEvent::new(c.clone(), WatchEventKind::Created));
        monitor.quiesce();
        assert_eq!(monitor.table().baseline(&c), Some(digest_bytes(b"early")));

        // The writer was not done yet; its close settles the baseline
        fs::write(&c, "early and late").unwrap();
        monitor.handle_watch_event(WatchEvent::new(c.clone(), WatchEventKind::Modified));
        monitor.quiesce();
        assert_eq!(
            monitor.table().baseline(&c),
            Some(digest_bytes(b"early and late"))
        );
        assert!(monitor.scan(ScanMode::Verify).all_ok());
    }

    #[test]
    fn test_hard_link_created_event_is_recorded() {
        let outside = tempdir().unwrap();
        let payload = outside.path().join("payload");
        fs::write(&payload, "").unwrap();

        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let monitor = monitor(&root);

        // Empty, but a second name for an existing inode
        let c = root.join("c");
        fs::hard_link(&payload, &c).unwrap();
        monitor.handle_watch_event(WatchEvent::new(c.clone(), WatchEventKind::Created));
        monitor.quiesce();
        assert_eq!(monitor.table().baseline(&c), Some(digest_bytes(b"")));
    }

    #[test]
    fn test_cycles_completed_counts_scans() {
        let dir = tempdir().unwrap();
        let monitor = monitor(dir.path());
        assert_eq!(monitor.cycles_completed(), 0);
        monitor.scan(ScanMode::Record);
        monitor.check_known();
        assert_eq!(monitor.cycles_completed(), 2);
    }

    #[test]
    fn test_excluded_event_ignored() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let config = MonitorConfig::new(&root)
            .unwrap()
            .with_workers(1)
            .unwrap()
            .with_excludes(&[r"\.swp$"])
            .unwrap();
        let monitor = Monitor::new(config).unwrap();

        let swap = root.join("x.swp");
        fs::write(&swap, "tmp").unwrap();
        monitor.handle_watch_event(WatchEvent::new(swap.clone(), WatchEventKind::Modified));
        monitor.quiesce();
        assert!(monitor.table().is_empty());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let dir = tempdir().unwrap();
        let monitor = monitor(dir.path());
        monitor.start_watching().unwrap();
        monitor.shutdown();
        monitor.shutdown();

        // Scans after shutdown reject everything and still return
        fs::write(dir.path().join("late"), "x").unwrap();
        let summary = monitor.scan(ScanMode::Record);
        assert_eq!(summary.rejected, 1);
        assert!(monitor.table().is_empty());
    }
}
