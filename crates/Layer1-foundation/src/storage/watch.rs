//! File change notification
//!
//! A [`ChangeWatcher`] hands out [`ChangeSubscription`]s that yield batches of
//! [`FileChange`]s. Dropping the subscription stops watching.

use crate::Result;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::any::Any;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Kind of change reported for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Changed,
    Deleted,
}

/// One changed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Live subscription to change batches
pub struct ChangeSubscription {
    rx: mpsc::UnboundedReceiver<Vec<FileChange>>,
    _guard: Box<dyn Any + Send>,
}

impl ChangeSubscription {
    /// `guard` is kept alive for as long as the subscription is
    pub fn new(rx: mpsc::UnboundedReceiver<Vec<FileChange>>, guard: Box<dyn Any + Send>) -> Self {
        Self { rx, _guard: guard }
    }

    /// Next batch, `None` once the source is gone
    pub async fn next(&mut self) -> Option<Vec<FileChange>> {
        self.rx.recv().await
    }
}

/// Source of file change notifications
pub trait ChangeWatcher: Send + Sync {
    /// Start watching `path`; the file does not need to exist yet
    fn watch(&self, path: &Path) -> Result<ChangeSubscription>;
}

/// [`ChangeWatcher`] backed by the platform's native file watcher
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyWatcher;

impl NotifyWatcher {
    pub fn new() -> Self {
        Self
    }
}

impl ChangeWatcher for NotifyWatcher {
    fn watch(&self, path: &Path) -> Result<ChangeSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let kind = match event.kind {
                        EventKind::Create(_) => ChangeKind::Created,
                        EventKind::Modify(_) => ChangeKind::Changed,
                        EventKind::Remove(_) => ChangeKind::Deleted,
                        _ => return,
                    };
                    let batch: Vec<FileChange> = event
                        .paths
                        .into_iter()
                        .map(|path| FileChange::new(path, kind))
                        .collect();
                    if !batch.is_empty() {
                        let _ = tx.send(batch);
                    }
                }
                Err(err) => warn!("File watch error: {}", err),
            })?;

        let (target, mode) = watch_target(path);
        watcher.watch(&target, mode)?;
        debug!(path = %path.display(), target = %target.display(), "Watching for changes");

        let guard: Box<dyn Any + Send> = Box::new(watcher);
        Ok(ChangeSubscription::new(rx, guard))
    }
}

/// Pick what to hand to the native watcher for `path`
///
/// The parent directory is watched so that create/delete of the file itself is
/// seen. When the parent does not exist yet, the nearest existing ancestor is
/// watched recursively.
fn watch_target(path: &Path) -> (PathBuf, RecursiveMode) {
    match path.parent() {
        Some(parent) if parent.is_dir() => (parent.to_path_buf(), RecursiveMode::NonRecursive),
        Some(parent) => {
            let ancestor = parent
                .ancestors()
                .find(|p| p.is_dir())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            (ancestor, RecursiveMode::Recursive)
        }
        None => (path.to_path_buf(), RecursiveMode::NonRecursive),
    }
}

/// True when two paths name the same file, tolerating symlinked directories
pub fn same_file_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    if a.file_name() != b.file_name() {
        return false;
    }
    match (a.parent(), b.parent()) {
        (Some(pa), Some(pb)) => match (pa.canonicalize(), pb.canonicalize()) {
            (Ok(ca), Ok(cb)) => ca == cb,
            _ => false,
        },
        _ => false,
    }
}
