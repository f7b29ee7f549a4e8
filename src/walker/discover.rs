//! Read-only tree discovery
//!
//! Walks the watched tree once and returns what it found: regular files to
//! reconcile, directories to watch, and entries that could not be read.
//! Nothing here touches the checksum table or the watcher, so discovery can
//! be tested on its own.
//!
//! Symlinks are not followed and are not reconciled.

use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::trace;
use walkdir::WalkDir;

/// Result of walking a tree
#[derive(Debug, Default, Clone)]
pub struct Discovery {
    /// Regular files, in walk order
    pub files: Vec<PathBuf>,

    /// Directories, root first
    pub dirs: Vec<PathBuf>,

    /// Entries the walk could not read, with the error text
    pub errors: Vec<(PathBuf, String)>,
}

/// Walk `root`, skipping any path (other than the root) matching `excludes`
pub fn discover(root: &Path, excludes: &[Regex]) -> Discovery {
    let mut found = Discovery::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_excluded(entry.path(), excludes));

    for entry in walker {
        match entry {
            Ok(entry) => {
                let file_type = entry.file_type();
                if file_type.is_dir() {
                    found.dirs.push(entry.into_path());
                } else if file_type.is_file() {
                    found.files.push(entry.into_path());
                } else {
                    trace!(path = %entry.path().display(), "Skipping non-regular entry");
                }
            }
            Err(e) => {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                let reason = match e.io_error() {
                    Some(io) => format!("read dir failed: {}", io),
                    None => e.to_string(),
                };
                found.errors.push((path, reason));
            }
        }
    }

    found
}

/// True if any pattern matches the full path
pub fn is_excluded(path: &Path, excludes: &[Regex]) -> bool {
    if excludes.is_empty() {
        return false;
    }
    let text = path.to_string_lossy();
    excludes.iter().any(|re| re.is_match(&text))
}
