//! Matcher Config - schema for diagnostic matchers
//!
//! These are plain data; compilation and validation happen when a matcher is
//! registered with the task service.

use crate::event::Severity;
use serde::{Deserialize, Serialize};

/// How a captured file path is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileLocationKind {
    /// Captured path is already absolute
    Absolute,
    /// Captured path is joined to the matcher's file prefix
    Relative,
}

impl Default for FileLocationKind {
    fn default() -> Self {
        Self::Relative
    }
}

/// Regex plus the capture groups that make up one diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternConfig {
    #[serde(rename = "patternName", alias = "name", default)]
    pub name: String,

    /// Regular expression, may span several lines with `\n`
    pub regexp: String,

    /// Lines one match covers. Needed when the regexp crosses lines without
    /// a literal `\n`, e.g. through `\s+`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<usize>,

    /// Group holding the file path
    pub file: usize,

    /// Group holding `line`, `line,column` or `line:column`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<usize>,

    /// Group holding the line (when not using `location`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,

    /// Group holding the column (when not using `location`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,

    /// Group holding a severity word ("error", "warning", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<usize>,
}

impl PatternConfig {
    /// Pattern with the file and location groups set
    pub fn new(name: impl Into<String>, regexp: impl Into<String>, file: usize, location: usize) -> Self {
        Self {
            name: name.into(),
            regexp: regexp.into(),
            lines: None,
            file,
            location: Some(location),
            line: None,
            column: None,
            severity: None,
            code: None,
            message: None,
        }
    }

    pub fn with_lines(mut self, lines: usize) -> Self {
        self.lines = Some(lines);
        self
    }

    pub fn with_code(mut self, group: usize) -> Self {
        self.code = Some(group);
        self
    }

    pub fn with_message(mut self, group: usize) -> Self {
        self.message = Some(group);
        self
    }

    pub fn with_severity(mut self, group: usize) -> Self {
        self.severity = Some(group);
        self
    }

    /// Every capture group index the pattern refers to
    pub fn groups(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        [
            ("file", Some(self.file)),
            ("location", self.location),
            ("line", self.line),
            ("column", self.column),
            ("severity", self.severity),
            ("code", self.code),
            ("message", self.message),
        ]
        .into_iter()
        .filter_map(|(name, group)| group.map(|g| (name, g)))
    }
}

/// A named matcher: pattern + file path interpretation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Owner stamped on every entry
    pub owner: String,

    #[serde(default)]
    pub file_location: FileLocationKind,

    /// Prefix for relative paths; `${workspaceRoot}` is substituted.
    /// Defaults to the workspace root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_prefix: Option<String>,

    /// Severity when the pattern has no severity group
    #[serde(default)]
    pub severity: Severity,

    pub pattern: PatternConfig,
}

impl MatcherConfig {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, pattern: PatternConfig) -> Self {
        Self {
            name: name.into(),
            label: None,
            owner: owner.into(),
            file_location: FileLocationKind::default(),
            file_prefix: None,
            severity: Severity::default(),
            pattern,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_file_location(mut self, kind: FileLocationKind) -> Self {
        self.file_location = kind;
        self
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = Some(prefix.into());
        self
    }
}
