//! Streaming output parser
//!
//! Output arrives in arbitrary chunks. The parser decodes UTF-8 across chunk
//! boundaries, strips ANSI escapes and carriage returns, and scans only
//! complete lines. A multi-line matcher sees a window of the last `span`
//! lines; every match is emitted once and the lines it covers are dropped.
//! Whatever is left when the stream ends is discarded.

use super::CompiledMatcher;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taskforge_foundation::ParsedEntry;
use tokio::sync::mpsc;
use tracing::trace;

/// Lines longer than this are skipped
const MAX_LINE_BYTES: usize = 64 * 1024;

pub struct OutputParser {
    matcher: Arc<CompiledMatcher>,
    prefix: PathBuf,

    /// Bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,

    /// Current incomplete line
    partial: String,

    /// Set while skipping an over-long line
    discarding: bool,

    /// Complete lines kept for multi-line matches
    window: VecDeque<String>,
}

impl OutputParser {
    pub fn new(matcher: Arc<CompiledMatcher>, workspace_root: &Path) -> Self {
        let prefix = matcher.file_prefix(workspace_root);
        Self {
            matcher,
            prefix,
            pending: Vec::new(),
            partial: String::new(),
            discarding: false,
            window: VecDeque::new(),
        }
    }

    pub fn matcher(&self) -> &Arc<CompiledMatcher> {
        &self.matcher
    }

    /// Consume a chunk, returning the entries completed by it in stream order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ParsedEntry> {
        let text = self.decode(chunk);
        let mut entries = Vec::new();

        for piece in text.split_inclusive('\n') {
            match piece.strip_suffix('\n') {
                Some(rest) => {
                    let too_long = self.partial.len() + rest.len() > MAX_LINE_BYTES;
                    if self.discarding || too_long {
                        self.discarding = false;
                        self.partial.clear();
                        continue;
                    }
                    self.partial.push_str(rest);
                    let line = clean_line(&std::mem::take(&mut self.partial));
                    self.scan_line(line, &mut entries);
                }
                None => {
                    if self.discarding {
                        continue;
                    }
                    self.partial.push_str(piece);
                    if self.partial.len() > MAX_LINE_BYTES {
                        trace!(matcher = self.matcher.name(), "Skipping over-long line");
                        self.partial.clear();
                        self.discarding = true;
                    }
                }
            }
        }

        entries
    }

    /// End of stream; unmatched content is dropped
    pub fn finish(&mut self) {
        self.pending.clear();
        self.partial.clear();
        self.discarding = false;
        self.window.clear();
    }

    /// Bytes currently held between chunks
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
            + self.partial.len()
            + self.window.iter().map(String::len).sum::<usize>()
    }

    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut start = 0;
        while start < bytes.len() {
            match std::str::from_utf8(&bytes[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = bytes.len();
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&bytes[start..valid_end]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        // incomplete sequence at the end; wait for more bytes
                        None => {
                            self.pending = bytes[valid_end..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn scan_line(&mut self, line: String, entries: &mut Vec<ParsedEntry>) {
        self.window.push_back(line);

        let text = self
            .window
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");

        let mut consumed = 0;
        for caps in self.matcher.regex().captures_iter(&text) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.as_str().is_empty() {
                continue;
            }
            if let Some(entry) = self.matcher.entry(&caps, &self.prefix) {
                trace!(matcher = self.matcher.name(), file = %entry.file.display(), line = entry.line, "Entry found");
                entries.push(entry);
                consumed = whole.end();
            }
        }

        // Drop every line that starts inside a consumed match
        let mut offset = 0;
        while consumed > 0 && offset < consumed {
            match self.window.pop_front() {
                Some(line) => offset += line.len() + 1,
                None => break,
            }
        }

        let keep = self.matcher.span().saturating_sub(1);
        while self.window.len() > keep {
            self.window.pop_front();
        }
    }
}

fn clean_line(raw: &str) -> String {
    let stripped = strip_ansi_escapes::strip_str(raw);
    stripped.replace('\r', "")
}

/// Drive `parser` over a chunk stream until it closes, handing each entry to
/// `on_entry` as soon as it is found
pub async fn parse<F>(mut parser: OutputParser, mut output: mpsc::Receiver<Vec<u8>>, mut on_entry: F)
where
    F: FnMut(ParsedEntry),
{
    while let Some(chunk) = output.recv().await {
        for entry in parser.feed(&chunk) {
            on_entry(entry);
        }
    }
    parser.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatcherRegistry;
    use taskforge_foundation::{FileLocationKind, MatcherConfig, PatternConfig, Severity};

    const TSC_LINE: &str =
        "my-pkg: src/app.ts(12,5): error TS2304: Cannot find name 'foo'.\n";

    const RUSTC_OUTPUT: &str = "   Compiling demo v0.1.0\n\
        error[E0425]: cannot find value `x` in this scope\n  \
        --> src/main.rs:2:5\n\
        \x20 |\n";

    fn parser(name: &str) -> OutputParser {
        let registry = MatcherRegistry::with_builtins();
        OutputParser::new(registry.get(name).unwrap(), Path::new("/ws"))
    }

    fn feed_all(parser: &mut OutputParser, chunks: &[&[u8]]) -> Vec<ParsedEntry> {
        chunks.iter().flat_map(|c| parser.feed(c)).collect()
    }

    #[test]
    fn test_tsc_entry() {
        let entries = parser("tsc").feed(TSC_LINE.as_bytes());
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.owner, "tsc");
        assert_eq!(entry.file, PathBuf::from("/ws/src/app.ts"));
        assert_eq!((entry.line, entry.column), (12, 5));
        assert_eq!(entry.code.as_deref(), Some("TS2304"));
        assert_eq!(entry.message, "Cannot find name 'foo'.");
        assert_eq!(entry.severity, Severity::Error);
    }

    #[test]
    fn test_partial_line_waits_for_newline() {
        let mut parser = parser("tsc");
        let line = TSC_LINE.trim_end();
        assert!(parser.feed(line.as_bytes()).is_empty());
        assert_eq!(parser.feed(b"\n").len(), 1);
    }

    #[test]
    fn test_multiline_split_matches_single_chunk() {
        let whole = parser("rustc").feed(RUSTC_OUTPUT.as_bytes());
        assert_eq!(whole.len(), 1);
        assert_eq!(whole[0].file, PathBuf::from("/ws/src/main.rs"));
        assert_eq!((whole[0].line, whole[0].column), (2, 5));
        assert_eq!(whole[0].code.as_deref(), Some("E0425"));
        assert_eq!(whole[0].message, "cannot find value `x` in this scope");

        let bytes = RUSTC_OUTPUT.as_bytes();
        for split in 1..bytes.len() {
            let mut p = parser("rustc");
            let entries = feed_all(&mut p, &[&bytes[..split], &bytes[split..]]);
            assert_eq!(entries, whole, "split at byte {}", split);
        }
    }

    #[test]
    fn test_match_emitted_once() {
        let mut parser = parser("tsc");
        let first = parser.feed(TSC_LINE.as_bytes());
        let later = parser.feed(b"Found 1 error.\n");
        assert_eq!(first.len(), 1);
        assert!(later.is_empty());
    }

    #[test]
    fn test_ansi_and_crlf() {
        let colored = "\x1b[31mmy-pkg: src/app.ts(3,1): error TS1005: ';' expected.\x1b[0m\r\n";
        let entries = parser("tsc").feed(colored.as_bytes());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "';' expected.");
    }

    #[test]
    fn test_utf8_split_inside_char() {
        let line = "pkg: src/ünï.ts(1,2): error TS1: bad\n".as_bytes();
        let cut = line.iter().position(|&b| b >= 0x80).unwrap() + 1;

        let mut parser = parser("tsc");
        let entries = feed_all(&mut parser, &[&line[..cut], &line[cut..]]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file, PathBuf::from("/ws/src/ünï.ts"));
    }

    #[test]
    fn test_trailing_partial_discarded() {
        let mut parser = parser("tsc");
        assert!(parser.feed(TSC_LINE.trim_end().as_bytes()).is_empty());
        assert!(parser.buffered_len() > 0);
        parser.finish();
        assert_eq!(parser.buffered_len(), 0);
        assert!(parser.feed(b"").is_empty());
    }

    #[test]
    fn test_window_stays_bounded() {
        let mut parser = parser("rustc");
        for _ in 0..1000 {
            parser.feed(b"some unrelated build output line\n");
        }
        assert!(parser.buffered_len() < 100);
    }

    #[test]
    fn test_overlong_line_skipped() {
        let mut parser = parser("tsc");
        let junk = vec![b'x'; MAX_LINE_BYTES + 10];
        assert!(parser.feed(&junk).is_empty());
        assert!(parser.buffered_len() <= MAX_LINE_BYTES);
        // the rest of the over-long line is dropped, the next line is scanned
        let entries = parser.feed(format!("tail\n{}", TSC_LINE).as_bytes());
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_absolute_matcher_keeps_capture() {
        let registry = MatcherRegistry::new();
        registry
            .register(
                MatcherConfig::new(
                    "abs",
                    "lint",
                    PatternConfig::new("p", r"^(/\S+):(\d+:\d+) (.*)$", 1, 2).with_message(3),
                )
                .with_file_location(FileLocationKind::Absolute),
            )
            .unwrap();

        let mut parser = OutputParser::new(registry.get("abs").unwrap(), Path::new("/ws"));
        let entries = parser.feed(b"/src/lib.rs:4:7 unused import\n");
        assert_eq!(entries[0].file, PathBuf::from("/src/lib.rs"));
        assert_eq!((entries[0].line, entries[0].column), (4, 7));
        assert_eq!(entries[0].owner, "lint");
    }

    #[test]
    fn test_declared_lines_without_newline_escape() {
        let registry = MatcherRegistry::new();
        registry
            .register(MatcherConfig::new(
                "arrow",
                "rustc",
                PatternConfig {
                    name: "arrow".to_string(),
                    regexp: r"error: (.*)\s+--> (.*):(\d+):(\d+)".to_string(),
                    lines: Some(2),
                    file: 2,
                    location: None,
                    line: Some(3),
                    column: Some(4),
                    severity: None,
                    code: None,
                    message: Some(1),
                },
            ))
            .unwrap();

        let mut parser = OutputParser::new(registry.get("arrow").unwrap(), Path::new("/ws"));
        let entries = feed_all(&mut parser, &[b"error: mismatched types\n", b"  --> src/lib.rs:7:3\n"]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file, PathBuf::from("/ws/src/lib.rs"));
        assert_eq!((entries[0].line, entries[0].column), (7, 3));
        assert_eq!(entries[0].message, "mismatched types");
    }

    #[tokio::test]
    async fn test_parse_driver() {
        let (tx, rx) = mpsc::channel(8);
        let (split_a, split_b) = TSC_LINE.split_at(20);
        tx.send(split_a.as_bytes().to_vec()).await.unwrap();
        tx.send(split_b.as_bytes().to_vec()).await.unwrap();
        tx.send(b"pkg: b.ts(1,1): error TS2: partial".to_vec()).await.unwrap();
        drop(tx);

        let mut found = Vec::new();
        parse(parser("tsc"), rx, |entry| found.push(entry)).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 12);
    }
}
