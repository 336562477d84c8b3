//! Parsing of load-time diagnostics into structured [`TraceMessage`]s.
//!
//! Two shapes are recognized in the engine output:
//!
//! ```text
//! Warning: /tmp/game.pl:12:
//! Warning:    Singleton variables: [X]
//! ERROR: /tmp/game.pl:15:8: Syntax error: Operator expected
//! ```

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static WARNING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Warning:[ \t]+(.+?):(\d+):(?:\d+:)?[ \t]*\r?\nWarning:[ \t]+(.+?)\r?$")
        .expect("warning pattern")
});

static ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^ERROR:[ \t]+(.+?):(\d+):(?:\d+:)?[ \t]*(\S.*?)\r?$").expect("error pattern")
});

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Non-fatal remark, e.g. singleton variables or discontiguous clauses.
    Warning,
    /// Fatal problem in the offending clause.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "Warning"),
            Severity::Error => write!(f, "Error"),
        }
    }
}

/// One diagnostic extracted from an engine trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceMessage {
    /// Warning or error.
    pub severity: Severity,
    /// File reported by the engine.
    pub file: String,
    /// 1-based line number inside `file`.
    pub line: usize,
    /// Engine message.
    pub message: String,
    /// Literal text of the offending line, once resolved.
    pub source_line: Option<String>,
}

impl fmt::Display for TraceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_line {
            Some(source) => write!(f, "{} in `{}`: {}", self.severity, source, self.message),
            None => write!(f, "{} at line {}: {}", self.severity, self.line, self.message),
        }
    }
}

/// Extracts every recognized diagnostic from `trace`, in order of appearance.
pub fn parse_trace(trace: &str) -> Vec<TraceMessage> {
    let mut found: Vec<(usize, TraceMessage)> = Vec::new();

    for (regex, severity) in [(&*WARNING, Severity::Warning), (&*ERROR, Severity::Error)] {
        for caps in regex.captures_iter(trace) {
            let Ok(line) = caps[2].parse::<usize>() else {
                continue;
            };
            let start = caps.get(0).map_or(0, |m| m.start());
            found.push((
                start,
                TraceMessage {
                    severity,
                    file: caps[1].trim().to_string(),
                    line,
                    message: caps[3].trim().to_string(),
                    source_line: None,
                },
            ));
        }
    }

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, message)| message).collect()
}

/// Fills `source_line` with the matching (trimmed) line of `program`.
///
/// Messages pointing past the end of `program` are left unresolved.
pub fn resolve_line(message: &mut TraceMessage, program: &str) {
    message.source_line = message
        .line
        .checked_sub(1)
        .and_then(|index| program.lines().nth(index))
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty());
}

/// Keeps only the resolved messages whose offending line still occurs in `rules`.
///
/// Lines removed by a previous repair produce stale diagnostics that must not be fed back.
pub fn retain_current(messages: Vec<TraceMessage>, rules: &str) -> Vec<TraceMessage> {
    messages
        .into_iter()
        .filter(|message| {
            message
                .source_line
                .as_deref()
                .is_some_and(|line| rules.contains(line))
        })
        .collect()
}

/// Renders diagnostics as the feedback report given back to the generator, one per line.
pub fn feedback_report(messages: &[TraceMessage]) -> String {
    messages
        .iter()
        .map(TraceMessage::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
