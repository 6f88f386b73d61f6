//! Task definitions - the live catalog behind run-by-label
//!
//! The definitions file is comment-tolerant JSON:
//!
//! ```json
//! {
//!   // build the workspace
//!   "tasks": [
//!     { "label": "build", "command": "cargo", "args": ["build"], "errorMatcherName": "rustc" }
//!   ]
//! }
//! ```
//!
//! The file is loaded when the store opens and reloaded whenever it changes.
//! Bursts of change notifications collapse into one reload after a quiet
//! period; a pending reload is cancelled on shutdown.

use crate::task::TaskSpecification;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use taskforge_foundation::storage::{from_jsonc_str, same_file_path};
use taskforge_foundation::{ChangeSubscription, ChangeWatcher, Error, FileStore, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Raw file layout; entries are validated one by one
#[derive(Debug, Deserialize)]
struct DefinitionsFile {
    #[serde(default)]
    tasks: Vec<serde_json::Value>,
}

// ============================================================================
// Catalog
// ============================================================================

/// Definitions keyed by unique label, in file order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    order: Vec<String>,
    by_label: HashMap<String, Arc<TaskSpecification>>,
}

impl Catalog {
    /// Add a definition unless the label is taken; the first one wins
    pub fn insert(&mut self, spec: TaskSpecification) -> bool {
        if self.by_label.contains_key(&spec.label) {
            return false;
        }
        self.order.push(spec.label.clone());
        self.by_label.insert(spec.label.clone(), Arc::new(spec));
        true
    }

    pub fn get(&self, label: &str) -> Option<Arc<TaskSpecification>> {
        self.by_label.get(label).cloned()
    }

    pub fn labels(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Parse definitions file content; bad entries and duplicates are logged
    /// and skipped, a malformed document is an error
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let file: DefinitionsFile = from_jsonc_str(content)
            .map_err(|e| Error::definition_parse(path.display().to_string(), e.to_string()))?;

        let mut catalog = Catalog::default();
        for (index, value) in file.tasks.into_iter().enumerate() {
            let spec = match serde_json::from_value::<TaskSpecification>(value) {
                Ok(spec) => spec,
                Err(e) => {
                    warn!(path = %path.display(), index, "Skipping invalid task definition: {}", e);
                    continue;
                }
            };
            if spec.label.trim().is_empty() || spec.command.trim().is_empty() {
                warn!(path = %path.display(), index, "Skipping task definition without label or command");
                continue;
            }

            let label = spec.label.clone();
            if !catalog.insert(spec) {
                warn!(
                    path = %path.display(),
                    label = %label,
                    "{}; keeping the first definition",
                    Error::DuplicateLabel(label.clone())
                );
            }
        }
        Ok(catalog)
    }
}

// ============================================================================
// Store
// ============================================================================

pub struct TaskDefinitionStore {
    path: PathBuf,
    files: Arc<dyn FileStore>,
    catalog: RwLock<Catalog>,

    /// Bumped after every reload
    reloads: watch::Sender<u64>,

    /// Serializes read-modify-write of the file
    write_lock: tokio::sync::Mutex<()>,

    shutdown: CancellationToken,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl TaskDefinitionStore {
    /// Load `path` and start watching it
    ///
    /// A missing file is an empty catalog. Watch failures are logged; the
    /// store then only changes through [`reload`](Self::reload).
    pub async fn open(
        path: impl Into<PathBuf>,
        files: Arc<dyn FileStore>,
        watcher: &dyn ChangeWatcher,
        debounce: Duration,
    ) -> Arc<Self> {
        let path = path.into();
        let (reloads, _) = watch::channel(0);
        let store = Arc::new(Self {
            path,
            files,
            catalog: RwLock::new(Catalog::default()),
            reloads,
            write_lock: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            watch_task: Mutex::new(None),
        });

        // Subscribe before the first read so an edit made during it still
        // arrives as a change
        let changes = match watcher.watch(&store.path) {
            Ok(changes) => Some(changes),
            Err(e) => {
                error!(path = %store.path.display(), "Failed to watch task definitions: {}", e);
                None
            }
        };

        store.reload().await;

        if let Some(changes) = changes {
            let handle = tokio::spawn(watch_loop(
                Arc::downgrade(&store),
                changes,
                store.path.clone(),
                debounce,
                store.shutdown.clone(),
            ));
            *store.watch_task.lock() = Some(handle);
        }

        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Labels in file order
    pub fn labels(&self) -> Vec<String> {
        self.catalog.read().labels()
    }

    pub fn resolve(&self, label: &str) -> Result<Arc<TaskSpecification>> {
        self.catalog
            .read()
            .get(label)
            .ok_or_else(|| Error::TaskNotFound(label.to_string()))
    }

    /// Replace the catalog with the file's current content
    ///
    /// Read and parse errors are logged and leave the catalog empty.
    pub async fn reload(&self) {
        let catalog = match self.load().await {
            Ok(catalog) => catalog,
            Err(e) => {
                error!(path = %self.path.display(), "Failed to load task definitions: {}", e);
                Catalog::default()
            }
        };

        info!(path = %self.path.display(), count = catalog.len(), "Task definitions loaded");
        *self.catalog.write() = catalog;
        self.reloads.send_modify(|generation| *generation += 1);
    }

    async fn load(&self) -> Result<Catalog> {
        if !self.files.exists(&self.path).await {
            debug!(path = %self.path.display(), "No task definitions file");
            return Ok(Catalog::default());
        }
        let content = self.files.read_text(&self.path).await?;
        Catalog::parse(&content, &self.path)
    }

    /// Append a definition to the file and reload
    ///
    /// The file (and its directory) is created when missing. A label that is
    /// already in the file is rejected.
    pub async fn add_definition(&self, spec: TaskSpecification) -> Result<()> {
        if spec.label.trim().is_empty() {
            return Err(Error::Config("Task label must not be empty".to_string()));
        }

        {
            let _guard = self.write_lock.lock().await;
            let mut document = if self.files.exists(&self.path).await {
                let content = self.files.read_text(&self.path).await?;
                from_jsonc_str::<serde_json::Value>(&content).map_err(|e| {
                    Error::definition_parse(self.path.display().to_string(), e.to_string())
                })?
            } else {
                serde_json::json!({ "tasks": [] })
            };

            let tasks = document
                .as_object_mut()
                .map(|obj| obj.entry("tasks").or_insert_with(|| serde_json::json!([])))
                .and_then(serde_json::Value::as_array_mut)
                .ok_or_else(|| {
                    Error::definition_parse(
                        self.path.display().to_string(),
                        "expected an object with a \"tasks\" array",
                    )
                })?;

            let taken = tasks.iter().any(|task| {
                task.get("label").and_then(serde_json::Value::as_str) == Some(spec.label.as_str())
            });
            if taken {
                return Err(Error::DuplicateLabel(spec.label));
            }

            tasks.push(serde_json::to_value(&spec)?);
            let content = serde_json::to_string_pretty(&document)?;
            self.files.write_text(&self.path, &content).await?;
            info!(path = %self.path.display(), label = %spec.label, "Task definition added");
        }

        self.reload().await;
        Ok(())
    }

    /// Receiver that changes after every reload
    pub fn subscribe_reloads(&self) -> watch::Receiver<u64> {
        self.reloads.subscribe()
    }

    /// Stop watching; a pending reload is dropped
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.watch_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for TaskDefinitionStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Debounced reload loop
///
/// `pending` holds the deadline of the next reload; every relevant change
/// pushes it back by `debounce`.
async fn watch_loop(
    store: Weak<TaskDefinitionStore>,
    mut changes: ChangeSubscription,
    path: PathBuf,
    debounce: Duration,
    shutdown: CancellationToken,
) {
    let mut pending: Option<Instant> = None;

    loop {
        let deadline = pending.unwrap_or_else(Instant::now);
        tokio::select! {
            _ = shutdown.cancelled() => {
                if pending.take().is_some() {
                    debug!(path = %path.display(), "Pending reload cancelled");
                }
                break;
            }
            batch = changes.next() => match batch {
                Some(batch) => {
                    if batch.iter().any(|change| same_file_path(&change.path, &path)) {
                        pending = Some(Instant::now() + debounce);
                    }
                }
                None => {
                    debug!(path = %path.display(), "Change source closed");
                    break;
                }
            },
            _ = sleep_until(deadline), if pending.is_some() => {
                pending = None;
                let Some(store) = store.upgrade() else { break };
                store.reload().await;
            }
        }
    }
}
