//! Persisted agent state.
//!
//! Snapshots are written after a tournament and can be read back to rebuild an agent without
//! formalizing its game again, or to validate it offline.

use std::{fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::agent::AgentStatus;

/// Everything recorded about one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Generated agent name.
    pub name: String,
    /// Name of the strategy played.
    pub strategy_name: String,
    /// Formal strategy, or its description when it never got formalized.
    pub strategy: String,
    /// Formal game rules, when any were produced.
    #[serde(default)]
    pub game_rules: Option<String>,
    /// Legal moves extracted from the rules.
    #[serde(default)]
    pub game_moves: Vec<String>,
    /// Own then opponent player identifiers.
    #[serde(default)]
    pub game_players: Vec<String>,
    /// Final status.
    pub status: AgentStatus,
    /// Moves played, in order.
    #[serde(default)]
    pub moves: Vec<String>,
    /// Moves of the opponent, in order.
    #[serde(default)]
    pub opponent_moves: Vec<String>,
    /// Payoff received each round.
    #[serde(default)]
    pub payoffs: Vec<f64>,
    /// Sum of `payoffs`.
    #[serde(default)]
    pub total_payoff: f64,
    /// Move assumed before the first round.
    #[serde(default)]
    pub default_move: Option<String>,
    /// Feedback lines applied while repairing the programs.
    #[serde(default)]
    pub trace_messages: Vec<String>,
}

impl AgentSnapshot {
    /// Writes the snapshot as pretty-printed JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing snapshot {path:?}"))
    }

    /// Reads a snapshot written by [`save_json`](Self::save_json).
    pub fn load_json(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).with_context(|| format!("reading snapshot {path:?}"))?;
        serde_json::from_str(&json).with_context(|| format!("parsing snapshot {path:?}"))
    }
}
