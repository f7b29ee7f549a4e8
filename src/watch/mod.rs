//! Change notification
//!
//! One non-recursive OS watch per directory, with backend events reduced to
//! the handful of [`WatchEventKind`]s the monitor acts on and delivered
//! through a channel.

pub mod event;
pub mod watcher;

pub use event::{classify, WatchEvent, WatchEventKind};
pub use watcher::DirWatcher;
