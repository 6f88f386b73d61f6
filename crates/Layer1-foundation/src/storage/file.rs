//! File access used by the task service
//!
//! Command resolution and the task definition store only talk to the disk
//! through [`FileStore`], so tests can swap in their own implementation.

use crate::{Error, Result};
use async_trait::async_trait;
use std::path::Path;

/// Minimal asynchronous file access
#[async_trait]
pub trait FileStore: Send + Sync {
    /// True if a regular file exists at `path`
    async fn exists(&self, path: &Path) -> bool;

    /// Read a whole file as UTF-8 text
    async fn read_text(&self, path: &Path) -> Result<String>;

    /// Replace a file's content, creating parent directories as needed
    async fn write_text(&self, path: &Path, content: &str) -> Result<()>;
}

/// [`FileStore`] backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn read_text(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to read {}: {}", path.display(), e)))
    }

    async fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::Storage(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", path.display(), e)))
    }
}
