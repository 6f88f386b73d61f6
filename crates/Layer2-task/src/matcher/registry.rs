//! Matcher registry
//!
//! Matchers are compiled and checked when registered, so a broken pattern is
//! reported as configuration rather than surfacing mid-run.

use super::builtin_matchers;
use parking_lot::RwLock;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taskforge_foundation::{Error, FileLocationKind, MatcherConfig, ParsedEntry, Result, Severity};
use tracing::{debug, error};

/// Placeholder substituted in `filePrefix`
const WORKSPACE_ROOT_VAR: &str = "${workspaceRoot}";

/// A validated matcher with its regex compiled
#[derive(Debug)]
pub struct CompiledMatcher {
    config: MatcherConfig,
    regex: Regex,
    span: usize,
}

impl CompiledMatcher {
    pub fn compile(config: MatcherConfig) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(Error::invalid_matcher(&config.name, "name is empty"));
        }
        if config.owner.trim().is_empty() {
            return Err(Error::invalid_matcher(&config.name, "owner is empty"));
        }

        let pattern = &config.pattern;
        let regex = Regex::new(&pattern.regexp)
            .map_err(|e| Error::invalid_matcher(&config.name, e.to_string()))?;

        if pattern.file == 0 {
            return Err(Error::invalid_matcher(
                &config.name,
                "file must name a capture group",
            ));
        }
        if pattern.location.is_none() && pattern.line.is_none() {
            return Err(Error::invalid_matcher(
                &config.name,
                "pattern needs a location or line group",
            ));
        }

        // captures_len counts the implicit whole-match group
        let groups = regex.captures_len() - 1;
        for (field, index) in pattern.groups() {
            if index > groups {
                return Err(Error::invalid_matcher(
                    &config.name,
                    format!(
                        "{} refers to group {} but the regexp has {} groups",
                        field, index, groups
                    ),
                ));
            }
        }

        let span = match pattern.lines {
            Some(0) => {
                return Err(Error::invalid_matcher(&config.name, "lines must be at least 1"));
            }
            Some(lines) => lines,
            None => {
                let breaks = LineBreaks::scan(&pattern.regexp);
                if breaks.literal == 0 && breaks.implicit {
                    return Err(Error::invalid_matcher(
                        &config.name,
                        "regexp can match a line break; set `lines` to the number of lines one match covers",
                    ));
                }
                1 + breaks.literal
            }
        };
        Ok(Self {
            config,
            regex,
            span,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn owner(&self) -> &str {
        &self.config.owner
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Number of output lines one match can cover
    pub fn span(&self) -> usize {
        self.span
    }

    /// Directory relative file captures are joined to
    pub fn file_prefix(&self, workspace_root: &Path) -> PathBuf {
        match &self.config.file_prefix {
            Some(prefix) => {
                let expanded =
                    prefix.replace(WORKSPACE_ROOT_VAR, &workspace_root.to_string_lossy());
                let path = PathBuf::from(expanded);
                if path.is_absolute() {
                    path
                } else {
                    workspace_root.join(path)
                }
            }
            None => workspace_root.to_path_buf(),
        }
    }

    /// Build an entry from one match; `None` when a required field is missing
    pub(crate) fn entry(&self, caps: &Captures<'_>, prefix: &Path) -> Option<ParsedEntry> {
        let pattern = &self.config.pattern;
        let group = |index: Option<usize>| {
            index
                .and_then(|i| caps.get(i))
                .map(|m| m.as_str().trim())
                .filter(|s| !s.is_empty())
        };

        let file = group(Some(pattern.file))?;
        let (line, column) = match group(pattern.location) {
            Some(location) => parse_location(location)?,
            None => {
                let line = group(pattern.line)?.parse().ok()?;
                let column = group(pattern.column)
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(1);
                (line, column)
            }
        };

        let file = match self.config.file_location {
            FileLocationKind::Absolute => PathBuf::from(file),
            FileLocationKind::Relative => prefix.join(file),
        };

        let severity = group(pattern.severity)
            .and_then(Severity::from_word)
            .unwrap_or(self.config.severity);

        let message = match group(pattern.message) {
            Some(message) => message.to_string(),
            None => caps.get(0).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
        };

        Some(ParsedEntry {
            owner: self.config.owner.clone(),
            file,
            line,
            column,
            code: group(pattern.code).map(str::to_string),
            message,
            severity,
        })
    }
}

/// How a regexp source refers to line breaks
#[derive(Debug, Default, PartialEq, Eq)]
struct LineBreaks {
    /// `\n`, `\x0A`, `\x{A}` or a raw newline
    literal: usize,

    /// A construct that can swallow a line break: `\s+`, `\s*`, `\s{..}`,
    /// `[\s\S]` or the `s` flag
    implicit: bool,
}

impl LineBreaks {
    fn scan(regexp: &str) -> Self {
        let mut breaks = Self::default();
        let chars: Vec<char> = regexp.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '\n' => breaks.literal += 1,
                '\\' if i + 1 < chars.len() => {
                    i += 1;
                    match chars[i] {
                        'n' => breaks.literal += 1,
                        'x' => {
                            let (value, used) = hex_escape(&chars[i + 1..]);
                            if value == Some(0x0A) {
                                breaks.literal += 1;
                            }
                            i += used;
                        }
                        's' => {
                            let next = chars.get(i + 1).copied();
                            let paired = next == Some('\\') && chars.get(i + 2) == Some(&'S');
                            if matches!(next, Some('+' | '*' | '{')) || paired {
                                breaks.implicit = true;
                            }
                        }
                        'S' => {
                            if chars.get(i + 1) == Some(&'\\') && chars.get(i + 2) == Some(&'s') {
                                breaks.implicit = true;
                            }
                        }
                        _ => {}
                    }
                }
                '(' if chars.get(i + 1) == Some(&'?') => {
                    let flags = chars[i + 2..]
                        .iter()
                        .take_while(|c| c.is_ascii_alphabetic() || **c == '-');
                    for c in flags {
                        if *c == '-' {
                            break;
                        }
                        if *c == 's' {
                            breaks.implicit = true;
                        }
                    }
                }
                _ => {}
            }
            i += 1;
        }
        breaks
    }
}

/// Value of the hex digits after `\x` and how many chars they take
fn hex_escape(rest: &[char]) -> (Option<u32>, usize) {
    if rest.first() == Some(&'{') {
        let digits: String = rest[1..].iter().take_while(|c| **c != '}').collect();
        let used = digits.chars().count() + 2;
        (u32::from_str_radix(&digits, 16).ok(), used)
    } else {
        let digits: String = rest.iter().take(2).collect();
        (u32::from_str_radix(&digits, 16).ok(), digits.chars().count())
    }
}

/// `12`, `12,5`, `12:5` or `12,5,12,9` (extra fields ignored)
fn parse_location(location: &str) -> Option<(u32, u32)> {
    let mut parts = location.split([',', ':']).map(str::trim);
    let line = parts.next()?.parse().ok()?;
    let column = parts
        .next()
        .and_then(|c| c.parse().ok())
        .unwrap_or(1);
    Some((line, column))
}

// ============================================================================
// Registry
// ============================================================================

/// Compiled matchers by name
pub struct MatcherRegistry {
    matchers: RwLock<HashMap<String, Arc<CompiledMatcher>>>,
}

impl MatcherRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            matchers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry holding the built-in matchers
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for config in builtin_matchers() {
            if let Err(e) = registry.register(config) {
                error!("Built-in matcher rejected: {}", e);
            }
        }
        registry
    }

    /// Compile and add a matcher, replacing one with the same name
    pub fn register(&self, config: MatcherConfig) -> Result<()> {
        let compiled = CompiledMatcher::compile(config)?;
        debug!(matcher = compiled.name(), span = compiled.span(), "Matcher registered");
        self.matchers
            .write()
            .insert(compiled.name().to_string(), Arc::new(compiled));
        Ok(())
    }

    /// Register several matchers, stopping at the first invalid one
    pub fn register_all(&self, configs: impl IntoIterator<Item = MatcherConfig>) -> Result<()> {
        for config in configs {
            self.register(config)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CompiledMatcher>> {
        self.matchers.read().get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.matchers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for MatcherRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_foundation::PatternConfig;

    #[test]
    fn test_builtins_compile() {
        let registry = MatcherRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["gcc", "rustc", "tsc"]);
        assert_eq!(registry.get("tsc").unwrap().span(), 1);
        assert_eq!(registry.get("rustc").unwrap().span(), 2);
    }

    #[test]
    fn test_multi_line_without_literal_newline() {
        let pattern = || {
            PatternConfig {
                name: "rustc".to_string(),
                regexp: r"error: (.*)\s+--> (.*):(\d+):(\d+)".to_string(),
                lines: None,
                file: 2,
                location: None,
                line: Some(3),
                column: Some(4),
                severity: None,
                code: None,
                message: Some(1),
            }
        };

        let compile = |pattern| CompiledMatcher::compile(MatcherConfig::new("arrow", "rustc", pattern));

        let err = compile(pattern()).unwrap_err();
        assert!(matches!(err, Error::InvalidMatcher { .. }));
        assert!(err.to_string().contains("set `lines`"));

        assert_eq!(compile(pattern().with_lines(2)).unwrap().span(), 2);
        assert!(compile(pattern().with_lines(0)).is_err());
    }

    #[test]
    fn test_line_break_scan() {
        assert_eq!(LineBreaks::scan(r"(.*):\s(.*)\s?\(").literal, 0);
        assert!(!LineBreaks::scan(r"(.*):\s(.*)\s?\(").implicit);
        assert_eq!(LineBreaks::scan(r"a\nb\x0Ac\x{a}d").literal, 3);
        assert_eq!(LineBreaks::scan("a\nb").literal, 1);
        assert!(LineBreaks::scan(r"a[\s\S]*b").implicit);
        assert!(LineBreaks::scan(r"(?s)a.*b").implicit);
        assert!(!LineBreaks::scan(r"(?i-s)a.*b").implicit);
        assert!(!LineBreaks::scan(r"a\\s+b").implicit);
    }

    #[test]
    fn test_rejects_bad_regex() {
        let registry = MatcherRegistry::new();
        let err = registry
            .register(MatcherConfig::new(
                "bad",
                "x",
                PatternConfig::new("p", "(unclosed", 1, 1),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMatcher { ref name, .. } if name == "bad"));
        assert!(registry.get("bad").is_none());
    }

    #[test]
    fn test_rejects_out_of_range_group() {
        let registry = MatcherRegistry::new();
        let err = registry
            .register(MatcherConfig::new(
                "short",
                "x",
                PatternConfig::new("p", r"(.*):(\d+)", 1, 2).with_message(3),
            ))
            .unwrap_err();
        assert!(err.to_string().contains("message refers to group 3"));
    }

    #[test]
    fn test_rejects_missing_location() {
        let mut pattern = PatternConfig::new("p", r"(.*):(\d+)", 1, 2);
        pattern.location = None;
        let err = CompiledMatcher::compile(MatcherConfig::new("m", "x", pattern)).unwrap_err();
        assert!(matches!(err, Error::InvalidMatcher { .. }));
    }

    #[test]
    fn test_parse_location() {
        assert_eq!(parse_location("12"), Some((12, 1)));
        assert_eq!(parse_location("12,5"), Some((12, 5)));
        assert_eq!(parse_location("12:5"), Some((12, 5)));
        assert_eq!(parse_location("12,5,12,9"), Some((12, 5)));
        assert_eq!(parse_location("x"), None);
    }

    #[test]
    fn test_file_prefix() {
        let root = Path::new("/ws");
        let matcher = |prefix: Option<&str>| {
            let mut config =
                MatcherConfig::new("m", "x", PatternConfig::new("p", r"(.*):(\d+)", 1, 2));
            config.file_prefix = prefix.map(str::to_string);
            CompiledMatcher::compile(config).unwrap()
        };

        assert_eq!(matcher(None).file_prefix(root), PathBuf::from("/ws"));
        assert_eq!(
            matcher(Some("${workspaceRoot}/packages")).file_prefix(root),
            PathBuf::from("/ws/packages")
        );
        assert_eq!(matcher(Some("src")).file_prefix(root), PathBuf::from("/ws/src"));
        assert_eq!(matcher(Some("/abs")).file_prefix(root), PathBuf::from("/abs"));
    }
}
