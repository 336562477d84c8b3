//! Capability interface over the external reasoning engine.
//!
//! A [`ReasoningSession`](super::ReasoningSession) never talks to a concrete engine directly: it
//! drives a boxed [`ReasoningEngine`] obtained from an [`EngineFactory`]. The bundled backend is
//! [`SwiplMqi`](super::swipl::SwiplMqi), but any engine able to consult files, answer queries and
//! report load-time diagnostics can be plugged in.

use std::path::Path;

use serde_json::Value;
use thiserror::Error;

/// One solution of a query: every named variable with the value it is bound to, in the order
/// reported by the engine.
pub type Bindings = Vec<(String, Value)>;

/// Protocol-level failures while talking to a reasoning engine.
///
/// A query without solutions is *not* an error: it is reported as an empty result.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine process could not be started or connected to.
    #[error("could not start reasoning engine: {0}")]
    Spawn(String),
    /// Reading from or writing to the engine failed.
    #[error("I/O error while talking to the reasoning engine: {0}")]
    Io(#[from] std::io::Error),
    /// The engine answered something that does not follow the protocol.
    #[error("malformed engine response: {0}")]
    Protocol(String),
    /// The engine raised an exception while evaluating a goal.
    #[error("engine exception: {0}")]
    Exception(String),
}

/// What a reasoning engine backend must provide.
///
/// Implementations are single-owner: a session issues one request at a time and never shares
/// its engine with another session.
pub trait ReasoningEngine: Send {
    /// Load the program stored at `path`.
    ///
    /// Returns `Ok(false)` when the engine refuses the file without raising.
    fn consult(&mut self, path: &Path) -> Result<bool, EngineError>;

    /// Evaluate `goal` once, for its truth value and side effects.
    fn run(&mut self, goal: &str) -> Result<bool, EngineError>;

    /// Enumerate the solutions of `goal`, keeping at most `limit` of them when set.
    ///
    /// Zero solutions is `Ok(vec![])`.
    fn solutions(&mut self, goal: &str, limit: Option<usize>)
        -> Result<Vec<Bindings>, EngineError>;

    /// Out-of-band critical diagnostics emitted since the previous call.
    fn drain_diagnostics(&mut self) -> Vec<String>;
}

/// Creates fresh engines, one per session.
pub trait EngineFactory: Send + Sync {
    /// Returns a new, empty engine.
    fn spawn(&self) -> Result<Box<dyn ReasoningEngine>, EngineError>;
}

/// Textual form of a bound value: atoms and strings lose their JSON quoting, everything else is
/// printed as-is.
pub fn term_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric form of a bound value, when it has one.
pub fn term_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn atoms_lose_their_quotes() {
        assert_eq!(term_text(&json!("C")), "C");
        assert_eq!(term_text(&json!(3)), "3");
    }

    #[test]
    fn numbers_are_read_from_numbers_and_numeric_atoms() {
        assert_eq!(term_number(&json!(3)), Some(3.0));
        assert_eq!(term_number(&json!(-1.5)), Some(-1.5));
        assert_eq!(term_number(&json!("4")), Some(4.0));
        assert_eq!(term_number(&json!("defect")), None);
    }
}
