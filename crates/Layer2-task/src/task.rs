//! Task specification and run requests

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of process a task is launched as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessKind {
    /// Plain child process; stdout and stderr are merged, stdin is closed
    Raw,

    /// Process attached to a pseudo-terminal
    #[serde(alias = "pty")]
    Terminal,
}

impl Default for ProcessKind {
    fn default() -> Self {
        Self::Raw
    }
}

impl ProcessKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessKind::Terminal)
    }
}

/// A runnable task, either from the definitions file or submitted inline
///
/// Shared as `Arc<TaskSpecification>` once submitted and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpecification {
    pub label: String,

    #[serde(default)]
    pub process_type: ProcessKind,

    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory; empty means the workspace root, relative paths are
    /// taken from the workspace root
    #[serde(default)]
    pub cwd: PathBuf,

    #[serde(default)]
    pub is_build: bool,

    /// Output matcher to bind; empty for none
    #[serde(default)]
    pub error_matcher_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_matcher_options: Option<serde_json::Value>,
}

impl TaskSpecification {
    pub fn new(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            process_type: ProcessKind::Raw,
            command: command.into(),
            args: Vec::new(),
            cwd: PathBuf::new(),
            is_build: false,
            error_matcher_name: String::new(),
            error_matcher_options: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_process_type(mut self, kind: ProcessKind) -> Self {
        self.process_type = kind;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_matcher(mut self, name: impl Into<String>) -> Self {
        self.error_matcher_name = name.into();
        self
    }

    pub fn as_build(mut self) -> Self {
        self.is_build = true;
        self
    }

    /// Working directory for a run rooted at `workspace_root`
    pub fn working_dir(&self, workspace_root: &std::path::Path) -> PathBuf {
        if self.cwd.as_os_str().is_empty() {
            workspace_root.to_path_buf()
        } else {
            workspace_root.join(&self.cwd)
        }
    }

    /// Command line for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a caller asks to run
#[derive(Debug, Clone, PartialEq)]
pub enum RunRequest {
    /// A label from the definitions catalog
    Label(String),

    /// An ad-hoc specification
    Inline(TaskSpecification),
}

impl From<&str> for RunRequest {
    fn from(label: &str) -> Self {
        RunRequest::Label(label.to_string())
    }
}

impl From<String> for RunRequest {
    fn from(label: String) -> Self {
        RunRequest::Label(label)
    }
}

impl From<TaskSpecification> for RunRequest {
    fn from(spec: TaskSpecification) -> Self {
        RunRequest::Inline(spec)
    }
}
