//! Watch events and their classification
//!
//! The OS backend reports many kinds of activity. Only the ones that matter
//! for integrity are kept:
//!
//! | backend event            | file          | directory     |
//! |--------------------------|---------------|---------------|
//! | create                   | `Created`     | `DirCreated`  |
//! | close after write        | `Modified`    | ignored       |
//! | rename into watched dir  | `MovedIn`     | `DirCreated`  |
//! | delete / rename away     | `Removed`     | `DirRemoved`  |

use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use std::path::PathBuf;

/// What happened to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    /// Regular file created or hard-linked in
    Created,
    /// Regular file closed after writing
    Modified,
    /// Regular file renamed into a watched directory
    MovedIn,
    /// Regular file deleted or renamed away
    Removed,
    /// Directory created or renamed in
    DirCreated,
    /// Directory deleted or renamed away
    DirRemoved,
}

/// A classified change notification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchEvent {
    /// Absolute path of the affected entry
    pub path: PathBuf,

    /// Kind of change
    pub kind: WatchEventKind,
}

impl WatchEvent {
    /// Build an event
    pub fn new(path: impl Into<PathBuf>, kind: WatchEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Map one backend event onto zero or more watch events
pub fn classify(event: &Event) -> Vec<WatchEvent> {
    let kinds: &[(usize, WatchEventKind)] = match event.kind {
        EventKind::Create(CreateKind::Folder) => &[(0, WatchEventKind::DirCreated)],
        EventKind::Create(_) => {
            return by_type(event, WatchEventKind::Created, WatchEventKind::DirCreated);
        }
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => &[(0, WatchEventKind::Modified)],
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            return by_type(event, WatchEventKind::MovedIn, WatchEventKind::DirCreated);
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            return gone(event.paths.first());
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths = [from, to]
            let mut out = gone(event.paths.first());
            if let Some(to) = event.paths.get(1) {
                out.push(WatchEvent::new(
                    to.clone(),
                    if to.is_dir() {
                        WatchEventKind::DirCreated
                    } else {
                        WatchEventKind::MovedIn
                    },
                ));
            }
            return out;
        }
        EventKind::Remove(RemoveKind::Folder) => &[(0, WatchEventKind::DirRemoved)],
        EventKind::Remove(_) => &[(0, WatchEventKind::Removed)],
        _ => &[],
    };

    kinds
        .iter()
        .filter_map(|(idx, kind)| {
            event
                .paths
                .get(*idx)
                .map(|path| WatchEvent::new(path.clone(), *kind))
        })
        .collect()
}

fn by_type(event: &Event, file: WatchEventKind, dir: WatchEventKind) -> Vec<WatchEvent> {
    event
        .paths
        .iter()
        .map(|path| {
            let kind = if path.is_dir() { dir } else { file };
            WatchEvent::new(path.clone(), kind)
        })
        .collect()
}

fn gone(path: Option<&PathBuf>) -> Vec<WatchEvent> {
    // Nothing left to stat after a rename away; the handler tells a watched
    // directory apart by its registration
    path.map(|p| vec![WatchEvent::new(p.clone(), WatchEventKind::Removed)])
        .unwrap_or_default()
}
