//! Event Types - task lifecycle and diagnostic events
//!
//! Everything a subscribed client can receive from the task service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Task ID
// ============================================================================

/// Service-unique task identifier, assigned in increasing order and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Severity of a diagnostic extracted from task output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Hint,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hint => "hint",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Parse the severity word printed by common compilers
    pub fn from_word(word: &str) -> Option<Self> {
        match word.trim().to_ascii_lowercase().as_str() {
            "error" | "fatal error" | "fatal" => Some(Self::Error),
            "warning" | "warn" => Some(Self::Warning),
            "info" | "note" => Some(Self::Info),
            "hint" | "help" => Some(Self::Hint),
            _ => None,
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Error
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One diagnostic extracted from task output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEntry {
    /// Matcher owner (e.g. "tsc")
    pub owner: String,

    /// Resolved absolute file path
    pub file: PathBuf,

    /// 1-based line, as captured
    pub line: u32,

    /// 1-based column, as captured (1 when the pattern has none)
    pub column: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    pub message: String,

    pub severity: Severity,
}

// ============================================================================
// Task events
// ============================================================================

/// Published exactly once per task when its process is gone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExitEvent {
    pub task_id: TaskId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
}

impl TaskExitEvent {
    /// True when the process ended through a signal rather than a normal exit
    pub fn is_signaled(&self) -> bool {
        self.signal.is_some()
    }
}

/// A diagnostic found in the output of a running task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutputEntryEvent {
    pub task_id: TaskId,
    pub entry: ParsedEntry,
}

/// Tagged union of everything the broadcaster carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEvent {
    Exited(TaskExitEvent),
    OutputEntryFound(TaskOutputEntryEvent),
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Exited(e) => e.task_id,
            Self::OutputEntryFound(e) => e.task_id,
        }
    }
}

/// Returned to the caller of a successful run request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    /// Internal unique task id
    pub task_id: TaskId,

    /// OS PID of the process running the task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_process_id: Option<u32>,

    /// Terminal id, present only for terminal (PTY) processes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_id: Option<u64>,

    /// Internal unique process id
    pub process_id: u64,
}
