//! Strategies played by agents.

use serde::{Deserialize, Serialize};

/// How an agent picks its move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// `select/4` for the agent's own player in the initial situation.
    #[default]
    Standard,
    /// `select/4` over the list of legal moves.
    Random,
}

impl StrategyKind {
    /// `Random` when the strategy name contains `random`.
    pub fn infer(name: &str) -> Self {
        if name.to_lowercase().contains("random") {
            StrategyKind::Random
        } else {
            StrategyKind::Standard
        }
    }
}

/// A strategy, either already formal or still described in natural language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Pre-written formal strategy.
    Program {
        /// Name of the strategy, e.g. `tit-for-tat`.
        name: String,
        /// Program text.
        program: String,
        /// Move selection.
        kind: StrategyKind,
    },
    /// Strategy to be formalized.
    Description {
        /// Name of the strategy.
        name: String,
        /// Natural-language description.
        description: String,
    },
}

impl Strategy {
    /// Formal strategy whose kind is inferred from its name.
    pub fn program(name: impl Into<String>, program: impl Into<String>) -> Self {
        let name = name.into();
        Strategy::Program {
            kind: StrategyKind::infer(&name),
            name,
            program: program.into(),
        }
    }

    /// Strategy described in natural language.
    pub fn description(name: impl Into<String>, description: impl Into<String>) -> Self {
        Strategy::Description {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Name of the strategy.
    pub fn name(&self) -> &str {
        match self {
            Strategy::Program { name, .. } | Strategy::Description { name, .. } => name,
        }
    }

    /// Move selection. Described strategies are always standard.
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Program { kind, .. } => *kind,
            Strategy::Description { .. } => StrategyKind::Standard,
        }
    }

    /// Text persisted with an agent: the program or the description.
    pub fn text(&self) -> &str {
        match self {
            Strategy::Program { program, .. } => program,
            Strategy::Description { description, .. } => description,
        }
    }
}
