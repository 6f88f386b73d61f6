//! Command resolution
//!
//! Turns the command of a task specification into the path that gets spawned.
//! First match wins:
//!
//! 1. an absolute path that exists is used as is
//! 2. otherwise the command is looked up under the workspace root; an
//!    absolute command is appended to the root as written
//! 3. a bare name is searched in every directory of the search path, in order

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taskforge_foundation::{Error, FileStore, Result};
use tracing::debug;

pub struct CommandResolver {
    files: Arc<dyn FileStore>,

    /// Overrides `PATH` when set
    search_path: Option<OsString>,
}

impl CommandResolver {
    pub fn new(files: Arc<dyn FileStore>) -> Self {
        Self {
            files,
            search_path: None,
        }
    }

    /// Use `search_path` (platform separator) instead of the `PATH` variable
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    pub async fn resolve(&self, command: &str, workspace_root: &Path) -> Result<PathBuf> {
        if command.is_empty() {
            return Err(Error::CommandNotFound(command.to_string()));
        }

        let path = Path::new(command);
        if path.is_absolute() && self.files.exists(path).await {
            return Ok(path.to_path_buf());
        }

        let in_workspace =
            workspace_root.join(command.trim_start_matches(std::path::is_separator));
        if self.files.exists(&in_workspace).await {
            debug!(command, resolved = %in_workspace.display(), "Resolved in workspace");
            return Ok(in_workspace);
        }

        if is_bare_name(command) {
            for dir in self.search_dirs() {
                if dir.as_os_str().is_empty() {
                    continue;
                }
                let candidate = dir.join(command);
                if self.files.exists(&candidate).await {
                    debug!(command, resolved = %candidate.display(), "Resolved on search path");
                    return Ok(candidate);
                }
            }
        }

        Err(Error::CommandNotFound(command.to_string()))
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        let raw = match &self.search_path {
            Some(value) => Some(value.clone()),
            None => std::env::var_os("PATH"),
        };
        raw.map(|value| std::env::split_paths(&value).collect())
            .unwrap_or_default()
    }
}

fn is_bare_name(command: &str) -> bool {
    !command.chars().any(std::path::is_separator)
}
