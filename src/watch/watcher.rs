//! Per-directory OS watches
//!
//! Wraps the platform watcher (inotify on Linux) with one non-recursive
//! watch per directory. New subdirectories are added explicitly by the
//! orchestrator as they are discovered, so the set of watched directories
//! is always known and can be dropped one at a time.

use crate::error::WatchError;
use crate::watch::event::{classify, WatchEvent};
use crossbeam_channel::Sender;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// OS watcher plus the registry of directories it holds watches on
pub struct DirWatcher {
    inner: RecommendedWatcher,
    registry: HashSet<PathBuf>,
}

impl DirWatcher {
    /// Create a watcher that forwards classified events into `events`
    pub fn new(events: Sender<WatchEvent>) -> Result<Self, WatchError> {
        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for classified in classify(&event) {
                    trace!(path = %classified.path.display(), kind = ?classified.kind, "Watch event");
                    if events.send(classified).is_err() {
                        // Receiver gone: the monitor is shutting down
                        return;
                    }
                }
            }
            Err(e) => warn!("Watch error: {}", e),
        };

        let inner = RecommendedWatcher::new(handler, Config::default())
            .map_err(|e| WatchError::InitFailed(e.to_string()))?;

        Ok(Self {
            inner,
            registry: HashSet::new(),
        })
    }

    /// Start watching one directory
    ///
    /// Returns false if the directory was already registered.
    pub fn watch(&mut self, dir: &Path) -> Result<bool, WatchError> {
        if self.registry.contains(dir) {
            return Ok(false);
        }
        if !dir.is_dir() {
            return Err(WatchError::InvalidPath {
                path: dir.to_path_buf(),
            });
        }

        self.inner
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::from_notify(dir.to_path_buf(), e))?;
        self.registry.insert(dir.to_path_buf());
        debug!(dir = %dir.display(), "Watch registered");
        Ok(true)
    }

    /// Drop the watch on `dir` and on every registered directory below it
    ///
    /// Returns the number of registrations removed. The kernel usually
    /// drops the watch of a deleted directory on its own, so backend errors
    /// here are only logged.
    pub fn unwatch(&mut self, dir: &Path) -> usize {
        let doomed: Vec<PathBuf> = self
            .registry
            .iter()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect();

        for path in &doomed {
            if let Err(e) = self.inner.unwatch(path) {
                trace!(dir = %path.display(), error = %e, "Unwatch failed");
            }
            self.registry.remove(path);
        }

        if !doomed.is_empty() {
            info!(dir = %dir.display(), count = doomed.len(), "Watch removed");
        }
        doomed.len()
    }

    /// True if `dir` holds a watch
    pub fn is_watched(&self, dir: &Path) -> bool {
        self.registry.contains(dir)
    }

    /// Registered directories, sorted
    pub fn watched(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.registry.iter().cloned().collect();
        dirs.sort();
        dirs
    }

    /// Number of registered directories
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// True if nothing is watched
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

impl std::fmt::Debug for DirWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirWatcher")
            .field("watched", &self.registry.len())
            .finish()
    }
}
