//! Error types for TaskForge
//!
//! All crates in the workspace share this error type.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// TaskForge error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Task execution
    // ========================================================================
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Task with label {0} not found")]
    TaskNotFound(String),

    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("Process error: {0}")]
    Process(String),

    // ========================================================================
    // Task definitions
    // ========================================================================
    #[error("Failed to parse task definitions {path}: {message}")]
    DefinitionParse { path: String, message: String },

    #[error("Duplicate task label: {0}")]
    DuplicateLabel(String),

    // ========================================================================
    // Output matchers
    // ========================================================================
    #[error("Invalid matcher {name}: {message}")]
    InvalidMatcher { name: String, message: String },

    // ========================================================================
    // Config / storage
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Watch error: {0}")]
    Watch(String),

    // ========================================================================
    // External error conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors that reject a run request before any task id is issued
    pub fn is_run_rejection(&self) -> bool {
        matches!(
            self,
            Error::CommandNotFound(_) | Error::TaskNotFound(_) | Error::Spawn(_)
        )
    }

    /// Helper for definition file parse failures
    pub fn definition_parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::DefinitionParse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Helper for matcher misconfiguration
    pub fn invalid_matcher(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidMatcher {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<notify::Error> for Error {
    fn from(e: notify::Error) -> Self {
        Error::Watch(e.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::CommandNotFound("thisisnotavalidcommand".to_string());
        assert_eq!(err.to_string(), "Command not found: thisisnotavalidcommand");

        let err = Error::TaskNotFound("build".to_string());
        assert_eq!(err.to_string(), "Task with label build not found");
    }

    #[test]
    fn test_run_rejection() {
        assert!(Error::CommandNotFound("x".into()).is_run_rejection());
        assert!(Error::Spawn("denied".into()).is_run_rejection());
        assert!(!Error::DuplicateLabel("build".into()).is_run_rejection());
    }
}
