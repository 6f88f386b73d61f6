//! Matchers available without configuration

use taskforge_foundation::{FileLocationKind, MatcherConfig, PatternConfig};

/// `pkg: src/file.ts(12,5): error TS2304: message`
const TSC_PATTERN: &str = r"(.*):\s(.*)\s?\(([\d,]+)\):\serror\s(.*):\s(.*)";

/// `src/file.c:12:5: error: message`
const GCC_PATTERN: &str =
    r"^(.*?):(\d+):(\d+):\s+(?:fatal\s+)?(error|warning|note|info):\s+(.*)$";

/// `error[E0425]: message` followed by `  --> src/main.rs:2:5`
const RUSTC_PATTERN: &str =
    r"(?m)^(error|warning)(?:\[(\w+)\])?: (.*)\n\s*--> (.*?):(\d+):(\d+)$";

pub fn builtin_matchers() -> Vec<MatcherConfig> {
    vec![
        MatcherConfig::new(
            "tsc",
            "tsc",
            PatternConfig::new("lerna tsc", TSC_PATTERN, 2, 3)
                .with_lines(1)
                .with_code(4)
                .with_message(5),
        )
        .with_label("TypeScript compiler")
        .with_file_location(FileLocationKind::Relative),
        MatcherConfig::new(
            "gcc",
            "gcc",
            PatternConfig {
                name: "gcc".to_string(),
                regexp: GCC_PATTERN.to_string(),
                lines: Some(1),
                file: 1,
                location: None,
                line: Some(2),
                column: Some(3),
                severity: Some(4),
                code: None,
                message: Some(5),
            },
        )
        .with_label("GCC / Clang")
        .with_file_location(FileLocationKind::Relative),
        MatcherConfig::new(
            "rustc",
            "rustc",
            PatternConfig {
                name: "rustc".to_string(),
                regexp: RUSTC_PATTERN.to_string(),
                lines: Some(2),
                file: 4,
                location: None,
                line: Some(5),
                column: Some(6),
                severity: Some(1),
                code: Some(2),
                message: Some(3),
            },
        )
        .with_label("Rust compiler")
        .with_file_location(FileLocationKind::Relative),
    ]
}
