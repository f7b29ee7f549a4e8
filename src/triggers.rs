//! Background scan triggers
//!
//! Two sources start verification passes after the initial recording scan:
//! - the `crc-timer` [`PeriodicTrigger`], once per period
//! - the `crc-rescan` thread, once per [`Triggers::request_rescan`]
//!
//! Rescan requests queue on an unbounded channel. A request that arrives
//! while another cycle holds the scan lock runs as soon as that cycle ends;
//! none is dropped or merged.

use crate::error::WorkerError;
use crate::periodic::PeriodicTrigger;
use crate::walker::{Monitor, ScanMode};
use crossbeam_channel::{unbounded, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// The timer and the on-demand rescan thread for one monitor
pub struct Triggers {
    timer: PeriodicTrigger,
    rescan_tx: Option<Sender<()>>,
    rescan: Option<JoinHandle<()>>,
}

impl Triggers {
    /// Start both triggers; each runs `scan(Verify)` on `monitor`
    pub fn start(monitor: Arc<Monitor>, period: Duration) -> Result<Self, WorkerError> {
        let timer_monitor = Arc::clone(&monitor);
        let timer = PeriodicTrigger::start("crc-timer", period, move || {
            timer_monitor.scan(ScanMode::Verify);
        })?;

        let (rescan_tx, rescan_rx) = unbounded::<()>();
        let rescan = thread::Builder::new()
            .name("crc-rescan".to_string())
            .spawn(move || {
                for () in rescan_rx.iter() {
                    if monitor.is_stopped() {
                        break;
                    }
                    monitor.scan(ScanMode::Verify);
                }
                debug!("Rescan thread exiting");
            })
            .map_err(|e| WorkerError::InitFailed {
                name: "crc-rescan".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            timer,
            rescan_tx: Some(rescan_tx),
            rescan: Some(rescan),
        })
    }

    /// Queue one verification pass; false once stopped
    pub fn request_rescan(&self) -> bool {
        self.rescan_tx
            .as_ref()
            .is_some_and(|tx| tx.send(()).is_ok())
    }

    /// Stop the timer, then let the rescan thread finish its queue
    ///
    /// Shut the monitor down first so pending passes end quickly. Idempotent.
    pub fn stop(&mut self) {
        self.timer.stop();
        drop(self.rescan_tx.take());

        if let Some(handle) = self.rescan.take() {
            if handle.join().is_err() {
                warn!("Rescan thread panicked");
            }
        }
    }
}

impl Drop for Triggers {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::store::FileStatus;
    use crate::walker::ScanPhase;
    use crossbeam_channel::bounded;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Instant;
    use tempfile::tempdir;

    fn monitor(root: &Path) -> Arc<Monitor> {
        let config = MonitorConfig::new(root).unwrap().with_workers(2).unwrap();
        Arc::new(Monitor::new(config).unwrap())
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        done()
    }

    #[test]
    fn test_timer_reports_mismatch() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let a = root.join("a");
        fs::write(&a, "hello").unwrap();

        let monitor = monitor(&root);
        monitor.scan(ScanMode::Record);
        fs::write(&a, "tampered").unwrap();

        let mut triggers = Triggers::start(Arc::clone(&monitor), Duration::from_millis(50)).unwrap();
        let failed = wait_until(|| {
            monitor.table().get(&a).map(|r| r.status) == Some(FileStatus::Fail)
        });
        triggers.stop();

        assert!(failed);
        assert!(monitor.cycles_completed() >= 2);
    }

    #[test]
    fn test_rescan_during_running_scan_still_runs() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("a"), "hello").unwrap();

        let monitor = monitor(&root);
        monitor.scan(ScanMode::Record);
        let mut triggers = Triggers::start(Arc::clone(&monitor), Duration::from_secs(3600)).unwrap();

        // A unit that holds the barrier keeps the next scan in quiescence
        let (gate_tx, gate_rx) = bounded::<()>(0);
        monitor
            .dispatcher()
            .submit(PathBuf::from("/gate"), ScanMode::Verify, move || {
                gate_rx.recv().ok();
            })
            .unwrap();

        let scanning = Arc::clone(&monitor);
        let running = thread::spawn(move || scanning.scan(ScanMode::Verify));
        assert!(wait_until(|| monitor.phase() == ScanPhase::AwaitingQuiescence));

        assert!(triggers.request_rescan());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(monitor.cycles_completed(), 1);

        drop(gate_tx);
        assert!(running.join().unwrap().all_ok());
        assert!(wait_until(|| monitor.cycles_completed() == 3));

        triggers.stop();
        assert!(!triggers.request_rescan());
    }
}
