//! Workspace root lookup

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use taskforge_foundation::Result;

/// Supplies the workspace root that relative commands, working directories
/// and task files are resolved against
#[async_trait]
pub trait WorkspaceRootProvider: Send + Sync {
    async fn root(&self) -> Result<PathBuf>;
}

#[async_trait]
impl WorkspaceRootProvider for PathBuf {
    async fn root(&self) -> Result<PathBuf> {
        Ok(self.clone())
    }
}

/// Make `path` absolute against the current directory without touching the disk
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
