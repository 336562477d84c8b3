//! # Formal Tournament
//!
//! Turns natural-language descriptions of two-player normal-form games into logic programs with a
//! language model, checks them with a Prolog engine, and plays the resulting agents against each
//! other in iterated tournaments.
//!
//! It provides:
//! - Formalization agents ([`FormalizationAgent`](crate::agent::FormalizationAgent)) that
//!   generate, load, diagnose and repair game rules and strategies
//! - A reasoning session over SWI-Prolog's machine query interface (the [`session`] module)
//! - A text generator over any chat-completions endpoint (the [`generation`] module)
//! - Tournaments pairing agents with shadow clones or round robin (the [`tournament`] module)
//! - An offline validator cross-checking persisted agents against ground-truth matrices (the
//!   [`validator`] module)
//!
//! Every agent loads three fragments in one engine: a game-independent solver, its game rules
//! and its strategy. An agent is accepted once the combined program loads without diagnostics
//! and exposes legal moves, two players and a default move.
//!
//! # Documentation Overview
//!
//! - For the repair loop and the reasons a program is rejected, see the [`formalization`] module.
//! - For configuring tournament behavior, see
//!   [`Configuration`](crate::configuration::Configuration).
//! - For plugging in another engine or generator, check out the
//!   [`EngineFactory`](crate::session::engine::EngineFactory) and
//!   [`GeneratorFactory`](crate::generation::GeneratorFactory) traits.
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use formal_tournament::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let templates = PromptTemplates::from_files("prompts/game.txt", "prompts/feedback.txt", None)?;
//!     let collaborators = Collaborators::new(
//!         std::fs::read_to_string("solver.pl")?,
//!         templates,
//!         Arc::new(SwiplConfig::from_env()),
//!         Arc::new(ChatConfig::from_env()?),
//!     );
//!
//!     let game = GameSource::Description(std::fs::read_to_string("games/pd_canonic_1.txt")?);
//!     let strategies = StrategySource::programs_from_dir("strategies")?;
//!     let mode = PairingMode::Clones {
//!         counter_strategy: Strategy::program("anti-default", std::fs::read_to_string("anti.pl")?),
//!     };
//!
//!     let mut tournament = Tournament::new(
//!         Configuration::from_env(),
//!         collaborators,
//!         game,
//!         strategies,
//!         mode,
//!     )?;
//!     tournament.create_agents()?;
//!     tournament.play_tournament()?;
//!     for winner in tournament.get_winners() {
//!         println!("{}: {}", winner.name(), winner.total_payoff());
//!     }
//!     tournament.save_agents("agents")?;
//!
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

pub use anyhow;

pub mod agent;
pub mod configuration;
pub mod formalization;
pub mod game;
pub mod generation;
mod logger;
pub mod naming;
pub mod session;
pub mod snapshot;
pub mod strategy;
pub mod tournament;
pub mod validator;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use formal_tournament::prelude::*;
/// ```
///
/// Includes:
/// - [`Configuration`](crate::configuration::Configuration)
/// - [`Collaborators`](crate::agent::Collaborators) and the agent itself
/// - the SWI-Prolog and chat-completions backends
/// - [`Tournament`](crate::tournament::Tournament) and its sources and modes
pub mod prelude {
    pub use crate::agent::{AgentStatus, Collaborators, FormalizationAgent, GameSource};
    pub use crate::configuration::Configuration;
    pub use crate::formalization::prompt::PromptTemplates;
    pub use crate::generation::{ChatConfig, GeneratorFactory, TextGenerator};
    pub use crate::session::engine::{EngineFactory, ReasoningEngine};
    pub use crate::session::swipl::SwiplConfig;
    pub use crate::snapshot::AgentSnapshot;
    pub use crate::strategy::Strategy;
    pub use crate::tournament::pairing::PairingMode;
    pub use crate::tournament::sources::StrategySource;
    pub use crate::tournament::Tournament;
}
