//! Periodic trigger
//!
//! A named thread that runs an action every `period`. The action runs on
//! the trigger's own thread, so a slow action delays the next tick instead
//! of overlapping with it.
//!
//! Stopping closes the shutdown channel. A closed channel stays closed, so
//! a stop requested before the thread reaches its first wait still wakes
//! it immediately.

use crate::error::WorkerError;
use crossbeam_channel::{after, bounded, select, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cancellable ticker thread
pub struct PeriodicTrigger {
    name: String,
    shutdown_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTrigger {
    /// Spawn a thread that calls `action` every `period` until stopped
    pub fn start<F>(name: &str, period: Duration, action: F) -> Result<Self, WorkerError>
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || tick_loop(period, shutdown_rx, action))
            .map_err(|e| WorkerError::InitFailed {
                name: thread_name.clone(),
                reason: e.to_string(),
            })?;

        info!(name, period_secs = period.as_secs(), "Periodic trigger started");

        Ok(Self {
            name: thread_name,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// True until [`stop`](Self::stop) has been called
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the thread and wait for it
    ///
    /// An action that is already running finishes first. Idempotent.
    pub fn stop(&mut self) {
        drop(self.shutdown_tx.take());

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(name = %self.name, "Periodic trigger panicked");
            } else {
                debug!(name = %self.name, "Periodic trigger stopped");
            }
        }
    }
}

impl Drop for PeriodicTrigger {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tick_loop<F: FnMut()>(period: Duration, shutdown_rx: Receiver<()>, mut action: F) {
    loop {
        select! {
            recv(shutdown_rx) -> _ => return,
            recv(after(period)) -> _ => action(),
        }
    }
}
