//! Raw error text to display category and line number.

use std::{fmt, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    SyntaxError,
    ReferenceError,
    TypeError,
    RangeError,
    NetworkError,
    RuntimeError,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SyntaxError => "SyntaxError",
            Self::ReferenceError => "ReferenceError",
            Self::TypeError => "TypeError",
            Self::RangeError => "RangeError",
            Self::NetworkError => "NetworkError",
            Self::RuntimeError => "RuntimeError",
        };
        f.write_str(s)
    }
}

/// Read-only view over a raw error string. Recomputed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedError {
    pub category: ErrorCategory,
    pub line_number: Option<u32>,
    pub message: String,
}

// First match wins.
const RULES: &[(&str, ErrorCategory)] = &[
    ("SyntaxError", ErrorCategory::SyntaxError),
    ("ReferenceError", ErrorCategory::ReferenceError),
    ("TypeError", ErrorCategory::TypeError),
    ("RangeError", ErrorCategory::RangeError),
    ("NetworkError", ErrorCategory::NetworkError),
    ("fetch", ErrorCategory::NetworkError),
];

fn line_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"line (\d+)", r":(\d+):", r"at line (\d+)"]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Total over all inputs: anything unmatched is a `RuntimeError`.
pub fn classify(raw: &str) -> ParsedError {
    let matched = RULES.iter().find(|(needle, _)| raw.contains(needle));
    let category = matched
        .map(|(_, c)| *c)
        .unwrap_or(ErrorCategory::RuntimeError);

    ParsedError {
        category,
        line_number: extract_line(raw),
        message: headline(raw, matched.map(|(needle, _)| *needle)),
    }
}

fn extract_line(raw: &str) -> Option<u32> {
    line_patterns()
        .iter()
        .find_map(|re| re.captures(raw))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

/// The line naming the matched category, else the last non-empty line
/// (Python tracebacks end with the exception line).
fn headline(raw: &str, needle: Option<&str>) -> String {
    let mut lines = raw.lines().map(str::trim).filter(|l| !l.is_empty());
    let picked = match needle {
        Some(n) => raw
            .lines()
            .map(str::trim)
            .find(|l| l.contains(n))
            .or_else(|| lines.next_back()),
        None => lines.next_back(),
    };
    picked.unwrap_or("").to_string()
}
