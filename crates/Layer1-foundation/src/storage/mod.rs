//! Storage module for TaskForge
//!
//! - `file`: async file access used by the task service
//! - `watch`: file change notification
//! - `json`: JSON settings files (comments allowed)

mod file;
mod json;
mod watch;

pub use file::{FileStore, LocalFileStore};
pub use json::{from_jsonc_str, strip_json_comments, JsonStore, PROJECT_DIR};
pub use watch::{
    same_file_path, ChangeKind, ChangeSubscription, ChangeWatcher, FileChange, NotifyWatcher,
};
