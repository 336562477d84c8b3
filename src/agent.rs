//! Formalization agents: one game, one strategy, and the session that plays them.

use std::{fmt, path::Path, sync::Arc};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    formalization::{prompt::PromptTemplates, Formalization},
    game::GameModel,
    generation::GeneratorFactory,
    session::{
        engine::{term_number, term_text, EngineError, EngineFactory},
        ReasoningSession,
    },
    snapshot::AgentSnapshot,
    strategy::{Strategy, StrategyKind},
};

/// Where an agent stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Not formalized yet.
    Pending,
    /// Formalized and able to play.
    Correct,
    /// The programs never loaded within the attempt budget.
    SyntacticError,
    /// The generator ignored the output contract.
    InstructionFollowingError,
    /// A move or payoff could not be obtained while playing.
    RuntimeError,
    /// Excluded from its pairing.
    Disqualified,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Correct => "correct",
            AgentStatus::SyntacticError => "syntactic_error",
            AgentStatus::InstructionFollowingError => "instruction_following_error",
            AgentStatus::RuntimeError => "runtime_error",
            AgentStatus::Disqualified => "disqualified",
        };
        write!(f, "{s}")
    }
}

/// Errors raised by agent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The move is not one of the game's legal moves.
    #[error("'{0}' is not a legal move")]
    IllegalMove(String),
    /// The agent never reached an accepted session.
    #[error("agent has no loaded session")]
    NotInitialized,
    /// The engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Where the game rules of an agent come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameSource {
    /// Natural-language description, to be formalized.
    Description(String),
    /// Rules already formalized.
    Rules {
        /// Description the rules were made from, possibly empty.
        description: String,
        /// Formal rules.
        rules: String,
    },
}

impl GameSource {
    /// Pre-formalized rules with no description.
    pub fn rules(rules: impl Into<String>) -> Self {
        GameSource::Rules {
            description: String::new(),
            rules: rules.into(),
        }
    }

    /// Reads pre-formalized rules from a file.
    pub fn from_rules_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let rules =
            std::fs::read_to_string(path).with_context(|| format!("reading rules {path:?}"))?;
        Ok(Self::rules(rules))
    }

    /// Reuses the rules recorded in a snapshot.
    pub fn from_snapshot(snapshot: &AgentSnapshot) -> anyhow::Result<Self> {
        match &snapshot.game_rules {
            Some(rules) => Ok(Self::rules(rules.clone())),
            None => anyhow::bail!("snapshot of '{}' has no game rules", snapshot.name),
        }
    }

    fn into_model(self) -> GameModel {
        match self {
            GameSource::Description(description) => GameModel::new(description),
            GameSource::Rules { description, rules } => GameModel::with_rules(description, rules),
        }
    }
}

/// What every agent needs to formalize and load its programs.
#[derive(Clone)]
pub struct Collaborators {
    solver: Arc<str>,
    templates: Arc<PromptTemplates>,
    engines: Arc<dyn EngineFactory>,
    generators: Arc<dyn GeneratorFactory>,
    max_attempts: usize,
}

impl Collaborators {
    /// `solver` is the domain-independent program loaded with every game. One attempt by
    /// default.
    pub fn new(
        solver: impl Into<Arc<str>>,
        templates: PromptTemplates,
        engines: Arc<dyn EngineFactory>,
        generators: Arc<dyn GeneratorFactory>,
    ) -> Self {
        Self {
            solver: solver.into(),
            templates: Arc::new(templates),
            engines,
            generators,
            max_attempts: 1,
        }
    }

    /// Maximum number of generations per agent, at least one.
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub(crate) fn solver(&self) -> &str {
        &self.solver
    }

    pub(crate) fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    pub(crate) fn engines(&self) -> &dyn EngineFactory {
        self.engines.as_ref()
    }

    pub(crate) fn generators(&self) -> &dyn GeneratorFactory {
        self.generators.as_ref()
    }

    pub(crate) fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// One game formalization playing one strategy.
#[derive(Debug)]
pub struct FormalizationAgent {
    name: String,
    strategy_name: String,
    strategy: String,
    kind: StrategyKind,
    game: GameModel,
    session: Option<ReasoningSession>,
    status: AgentStatus,
    default_move: Option<String>,
    moves: Vec<String>,
    opponent_moves: Vec<String>,
    payoffs: Vec<f64>,
    trace_log: Vec<String>,
    attempts: usize,
}

impl FormalizationAgent {
    /// Formalizes `game` and `strategy` until the programs are accepted or the attempt budget is
    /// spent. Check [`status`](Self::status) to know which.
    #[instrument(skip_all, fields(name = %name.as_ref(), strategy = strategy.name()))]
    pub fn new(
        name: impl AsRef<str>,
        game: GameSource,
        strategy: Strategy,
        collaborators: &Collaborators,
    ) -> Self {
        let formalized = Formalization::new(collaborators, game.into_model(), &strategy).run();
        debug!(
            "formalization ended as {} after {} attempt(s)",
            formalized.status, formalized.attempts
        );

        let strategy_text = formalized
            .strategy_program
            .unwrap_or_else(|| strategy.text().to_string());
        let (session, default_move) = match formalized.accepted {
            Some(accepted) => (Some(accepted.session), Some(accepted.default_move)),
            None => (None, None),
        };

        Self {
            name: name.as_ref().to_string(),
            strategy_name: strategy.name().to_string(),
            strategy: strategy_text,
            kind: strategy.kind(),
            game: formalized.game,
            session,
            status: formalized.status,
            default_move,
            moves: vec![],
            opponent_moves: vec![],
            payoffs: vec![],
            trace_log: formalized.trace_log,
            attempts: formalized.attempts,
        }
    }

    /// Rebuilds an agent from its snapshot by loading the recorded rules and strategy into a
    /// fresh session. Nothing is generated.
    pub fn from_snapshot(
        snapshot: &AgentSnapshot,
        collaborators: &Collaborators,
    ) -> anyhow::Result<Self> {
        let game = GameSource::from_snapshot(snapshot)?;
        let strategy = Strategy::program(&snapshot.strategy_name, &snapshot.strategy);
        let mut agent = Self::new(&snapshot.name, game, strategy, collaborators);
        agent.trace_log = snapshot.trace_messages.clone();
        Ok(agent)
    }

    /// Selects the next move. `None` marks the agent as [`AgentStatus::RuntimeError`].
    pub fn play(&mut self) -> Option<String> {
        let goal = match self.kind {
            StrategyKind::Standard => {
                let own = self.game.players().map(|(own, _)| quoted(own));
                own.map(|own| format!("select({own},_,s0,M)"))
            }
            StrategyKind::Random => {
                let moves = self
                    .game
                    .legal_moves()
                    .iter()
                    .map(|m| quoted(m))
                    .collect::<Vec<_>>()
                    .join(",");
                Some(format!("select(_,_,[{moves}],M)"))
            }
        };

        let selected = match (goal, self.session.as_mut()) {
            (Some(goal), Some(session)) => session
                .get_variable_values(&goal, Some(1))
                .and_then(|values| values.first().map(term_text)),
            _ => None,
        };

        match selected {
            Some(selected) => {
                debug!("{} plays {selected}", self.name);
                self.moves.push(selected.clone());
                Some(selected)
            }
            None => {
                warn!("{} did not select a move", self.name);
                self.status = AgentStatus::RuntimeError;
                None
            }
        }
    }

    /// Records the opponent's move, then queries the payoff of the last round and informs the
    /// program of the opponent's move.
    ///
    /// Returns `false` and marks the agent as [`AgentStatus::RuntimeError`] when either fails. The
    /// payoff is then not recorded.
    pub fn update_payoff(&mut self, opponent_move: &str) -> bool {
        self.opponent_moves.push(opponent_move.to_string());

        let (Some(session), Some((own, opponent)), Some(last)) =
            (self.session.as_mut(), self.game.players(), self.moves.last())
        else {
            warn!("{} cannot receive a payoff", self.name);
            self.status = AgentStatus::RuntimeError;
            return false;
        };

        let (own, opponent) = (quoted(own), quoted(opponent));
        let payoff_goal = format!(
            "finally(goal({own}, U), do(move({own}, {}), do(move({opponent}, {}), s0)))",
            quoted(last),
            quoted(opponent_move)
        );
        let payoff = session
            .get_variable_values(&payoff_goal, Some(1))
            .and_then(|values| values.first().and_then(term_number));

        let update_goal = format!(
            "initialise(last_move({opponent}, {}), s0)",
            quoted(opponent_move)
        );
        let updated = session.apply_predicate(&update_goal).unwrap_or(false);

        match payoff {
            Some(payoff) if updated => {
                debug!("{} receives {payoff} against {opponent_move}", self.name);
                self.payoffs.push(payoff);
                true
            }
            _ => {
                warn!(
                    "{} could not update its payoff (payoff: {payoff:?}, updated: {updated})",
                    self.name
                );
                self.status = AgentStatus::RuntimeError;
                false
            }
        }
    }

    /// Replaces the default move of every player.
    pub fn update_default_move(&mut self, default_move: &str) -> Result<bool, AgentError> {
        if !self.game.is_legal(default_move) {
            return Err(AgentError::IllegalMove(default_move.to_string()));
        }
        let Some(session) = self.session.as_mut() else {
            return Err(AgentError::NotInitialized);
        };
        let goal = format!("initialise(default_move(_, {}), s0)", quoted(default_move));
        let applied = session.apply_predicate(&goal)?;
        if applied {
            self.default_move = Some(default_move.to_string());
        }
        Ok(applied)
    }

    /// Sum of the payoffs received so far.
    pub fn total_payoff(&self) -> f64 {
        self.payoffs.iter().sum()
    }

    /// Current state, ready to be persisted.
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            name: self.name.clone(),
            strategy_name: self.strategy_name.clone(),
            strategy: self.strategy.clone(),
            game_rules: self.game.rules().map(str::to_string),
            game_moves: self.game.legal_moves().to_vec(),
            game_players: self
                .game
                .players()
                .map(|(own, opponent)| vec![own.to_string(), opponent.to_string()])
                .unwrap_or_default(),
            status: self.status,
            moves: self.moves.clone(),
            opponent_moves: self.opponent_moves.clone(),
            payoffs: self.payoffs.clone(),
            total_payoff: self.total_payoff(),
            default_move: self.default_move.clone(),
            trace_messages: self.trace_log.clone(),
        }
    }

    /// Generated name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the strategy played.
    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    /// Move selection of the strategy.
    pub fn strategy_kind(&self) -> StrategyKind {
        self.kind
    }

    /// Formal strategy, or its description when it was never formalized.
    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    /// The game and what was extracted from its rules.
    pub fn game(&self) -> &GameModel {
        &self.game
    }

    /// Current status.
    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: AgentStatus) {
        self.status = status;
    }

    /// Whether formalization ended with an accepted session.
    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Default move read from the rules, or set since.
    pub fn default_move(&self) -> Option<&str> {
        self.default_move.as_deref()
    }

    /// Moves played so far.
    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    /// Opponent moves received so far.
    pub fn opponent_moves(&self) -> &[String] {
        &self.opponent_moves
    }

    /// Payoffs received so far.
    pub fn payoffs(&self) -> &[f64] {
        &self.payoffs
    }

    /// Feedback lines applied during formalization.
    pub fn trace_log(&self) -> &[String] {
        &self.trace_log
    }

    /// Generations spent during formalization.
    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

/// Quotes `atom` for use inside a goal.
pub(crate) fn quoted(atom: &str) -> String {
    format!("'{}'", atom.replace('\\', "\\\\").replace('\'', "\\'"))
}
