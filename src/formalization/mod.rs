//! The generate / load / repair loop turning descriptions into a loadable program.
//!
//! The loop is a small state machine:
//!
//! ```text
//! Generate(repairs) -> Load -> Accepted
//!        ^              |
//!        +--- repairs --+---> Exhausted
//! ```
//!
//! `Generate` with no repair formalizes whatever is still only described (game rules first,
//! then the strategy). With repairs, each listed target is rewritten from its current text and
//! the feedback report attached to it. Every `Generate` consumes one attempt, so the loop stops
//! after `max_attempts` generations at the latest. A response violating the `@...@` contract
//! ends the loop at once with [`AgentStatus::InstructionFollowingError`].

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::{
    agent::{quoted, AgentStatus, Collaborators},
    game::GameModel,
    generation::TextGenerator,
    session::{
        engine::term_text,
        trace::{feedback_report, retain_current, TraceMessage},
        ProgramFragments, ReasoningSession,
    },
    strategy::Strategy,
};

pub mod prompt;

use prompt::extract_program;

/// Which program a repair rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Formal game rules.
    GameRules,
    /// Formal strategy.
    StrategyRules,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::GameRules => write!(f, "game rules"),
            Target::StrategyRules => write!(f, "strategy"),
        }
    }
}

/// Feedback to apply to one target on the next generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repair {
    /// Program to rewrite.
    pub target: Target,
    /// Report given to the generator, one problem per line.
    pub report: String,
}

/// State of the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Produce or repair programs.
    Generate(Vec<Repair>),
    /// Load the current programs into a fresh session.
    Load,
    /// A session was loaded and all domain facts were extracted.
    Accepted,
    /// No further attempt will be made.
    Exhausted,
}

/// Why a loaded program was not accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// The engine reported diagnostics while loading.
    Diagnostics(Vec<TraceMessage>),
    /// The engine refused a fragment without any diagnostic.
    NotLoaded,
    /// Required predicates are missing.
    MissingPredicates(Vec<String>),
    /// No legal move in the initial situation.
    NoMoves,
    /// The program does not declare exactly two players.
    PlayerCount(usize),
    /// No default move for the agent's player.
    NoDefaultMove(String),
    /// A domain query raised instead of answering.
    QueryFailed(String),
    /// No engine could be started.
    EngineUnavailable(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Diagnostics(messages) if messages.is_empty() => {
                write!(f, "The program could not be loaded.")
            }
            Rejection::Diagnostics(messages) => write!(f, "{}", feedback_report(messages)),
            Rejection::NotLoaded => write!(f, "The program could not be loaded."),
            Rejection::MissingPredicates(missing) => write!(
                f,
                "The program does not define the required predicates: {}.",
                missing.join(", ")
            ),
            Rejection::NoMoves => write!(
                f,
                "The program does not define any possible move in the initial situation s0."
            ),
            Rejection::PlayerCount(count) => write!(
                f,
                "The program must declare exactly two players in s0, {count} found."
            ),
            Rejection::NoDefaultMove(player) => write!(
                f,
                "The program does not define an initial default move for player {player}."
            ),
            Rejection::QueryFailed(goal) => {
                write!(f, "The query `{goal}` raised an error against the program.")
            }
            Rejection::EngineUnavailable(reason) => {
                write!(f, "The reasoning engine is unavailable: {reason}")
            }
        }
    }
}

/// Result of running the loop.
pub(crate) struct Formalized {
    pub game: GameModel,
    pub strategy_program: Option<String>,
    pub status: AgentStatus,
    pub attempts: usize,
    pub trace_log: Vec<String>,
    pub accepted: Option<Accepted>,
}

/// What acceptance yields besides the game facts.
pub(crate) struct Accepted {
    pub session: ReasoningSession,
    pub default_move: String,
}

enum Interrupt {
    /// The backend failed; the listed repairs are still pending.
    Retry(Vec<Repair>),
    Stop(AgentStatus),
}

/// Runs the loop for one game and strategy.
pub(crate) struct Formalization<'a> {
    collaborators: &'a Collaborators,
    generator: Option<Box<dyn TextGenerator>>,
    game: GameModel,
    game_described: bool,
    strategy_description: Option<String>,
    strategy_program: Option<String>,
    status: AgentStatus,
    attempts: usize,
    trace_log: Vec<String>,
}

impl<'a> Formalization<'a> {
    /// `game` must carry rules already unless they are to be formalized from its description.
    pub fn new(collaborators: &'a Collaborators, game: GameModel, strategy: &Strategy) -> Self {
        let game_described = game.rules().is_none();
        let (strategy_description, strategy_program) = match strategy {
            Strategy::Program { program, .. } => (None, Some(program.clone())),
            Strategy::Description { description, .. } => (Some(description.clone()), None),
        };
        Self {
            collaborators,
            generator: None,
            game,
            game_described,
            strategy_description,
            strategy_program,
            status: AgentStatus::Pending,
            attempts: 0,
            trace_log: vec![],
        }
    }

    /// Drives the state machine to `Accepted` or `Exhausted`.
    pub fn run(mut self) -> Formalized {
        let max_attempts = self.collaborators.max_attempts();
        let mut accepted = None;
        let mut phase = Phase::Generate(vec![]);

        loop {
            phase = match phase {
                Phase::Generate(_) if self.attempts >= max_attempts => {
                    debug!("attempt budget of {max_attempts} spent");
                    Phase::Exhausted
                }
                Phase::Generate(repairs) => {
                    self.attempts += 1;
                    debug!("attempt {}/{max_attempts}", self.attempts);
                    match self.generate(repairs) {
                        Ok(()) => Phase::Load,
                        Err(Interrupt::Retry(pending)) => Phase::Generate(pending),
                        Err(Interrupt::Stop(status)) => {
                            self.status = status;
                            Phase::Exhausted
                        }
                    }
                }
                Phase::Load => match self.load() {
                    Ok(session) => {
                        accepted = Some(session);
                        Phase::Accepted
                    }
                    Err(rejection) => {
                        info!("program rejected: {rejection}");
                        let repairs = self.plan_repairs(&rejection);
                        if repairs.is_empty() {
                            Phase::Exhausted
                        } else {
                            Phase::Generate(repairs)
                        }
                    }
                },
                Phase::Accepted | Phase::Exhausted => break,
            };
        }

        self.status = match (&accepted, self.status) {
            (Some(_), _) => AgentStatus::Correct,
            (None, AgentStatus::Pending) => AgentStatus::SyntacticError,
            (None, status) => status,
        };

        Formalized {
            game: self.game,
            strategy_program: self.strategy_program,
            status: self.status,
            attempts: self.attempts,
            trace_log: self.trace_log,
            accepted,
        }
    }

    fn prompt(&mut self, instruction: &str) -> Result<String, Interrupt> {
        if self.generator.is_none() {
            match self.collaborators.generators().create() {
                Ok(generator) => self.generator = Some(generator),
                Err(e) => {
                    error!("no text generator available: {e}");
                    return Err(Interrupt::Stop(AgentStatus::SyntacticError));
                }
            }
        }
        let Some(generator) = self.generator.as_mut() else {
            return Err(Interrupt::Stop(AgentStatus::SyntacticError));
        };
        generator.prompt(instruction).map_err(|e| {
            warn!("generation failed: {e}");
            Interrupt::Retry(vec![])
        })
    }

    fn formalize(&mut self, instruction: &str) -> Result<String, Interrupt> {
        let response = self.prompt(instruction)?;
        extract_program(&response).map_err(|e| {
            warn!("{e}");
            Interrupt::Stop(AgentStatus::InstructionFollowingError)
        })
    }

    fn generate(&mut self, repairs: Vec<Repair>) -> Result<(), Interrupt> {
        if repairs.is_empty() {
            return self.generate_missing();
        }

        let mut pending = repairs.into_iter();
        while let Some(repair) = pending.next() {
            let code = match repair.target {
                Target::GameRules => self.game.rules(),
                Target::StrategyRules => self.strategy_program.as_deref(),
            }
            .unwrap_or_default()
            .to_string();
            let instruction = self
                .collaborators
                .templates()
                .feedback_prompt(&code, &repair.report);

            debug!("repairing {} with:\n{}", repair.target, repair.report);
            let program = match self.formalize(&instruction) {
                Ok(program) => program,
                Err(Interrupt::Retry(_)) => {
                    let mut remaining = vec![repair];
                    remaining.extend(pending);
                    return Err(Interrupt::Retry(remaining));
                }
                Err(stop) => return Err(stop),
            };

            self.trace_log
                .extend(repair.report.lines().map(str::to_string));
            match repair.target {
                Target::GameRules => self.game.set_rules(program),
                Target::StrategyRules => self.strategy_program = Some(program),
            }
        }
        Ok(())
    }

    fn generate_missing(&mut self) -> Result<(), Interrupt> {
        if self.game_described && self.game.rules().is_none() {
            debug!("formalizing game rules");
            let instruction = self
                .collaborators
                .templates()
                .game_prompt(self.game.description());
            let rules = self.formalize(&instruction)?;
            self.game.set_rules(rules);
        }

        if self.strategy_program.is_some() {
            return Ok(());
        }
        if let Some(description) = self.strategy_description.clone() {
            debug!("formalizing strategy");
            let Some(instruction) = self.collaborators.templates().strategy_prompt(&description)
            else {
                error!("a strategy description needs a strategy template");
                return Err(Interrupt::Stop(AgentStatus::SyntacticError));
            };
            let program = self.formalize(&instruction)?;
            self.strategy_program = Some(program);
        }
        Ok(())
    }

    fn load(&mut self) -> Result<Accepted, Rejection> {
        let engine = self.collaborators.engines().spawn().map_err(|e| {
            error!("could not start the reasoning engine: {e}");
            Rejection::EngineUnavailable(e.to_string())
        })?;

        let mut session = ReasoningSession::load(
            engine,
            ProgramFragments {
                solver: self.collaborators.solver(),
                game: self.game.rules().unwrap_or_default(),
                strategy: self.strategy_program.as_deref().unwrap_or_default(),
            },
        );

        if !session.is_valid() {
            return Err(if session.trace().is_some() {
                Rejection::Diagnostics(session.resolve_trace())
            } else if !session.missing_predicates().is_empty() {
                Rejection::MissingPredicates(session.missing_predicates().to_vec())
            } else {
                Rejection::NotLoaded
            });
        }

        let moves = query_all(&mut session, "possible(move(_,X), s0)", None)?;
        if moves.is_empty() {
            return Err(Rejection::NoMoves);
        }

        let players = query_all(&mut session, "holds(player(N), s0)", None)?;
        let [own, opponent] = <[String; 2]>::try_from(players)
            .map_err(|players| Rejection::PlayerCount(players.len()))?;

        let goal = format!("initially(default_move({}, X), s0)", quoted(&own));
        let Some(default_move) = query_all(&mut session, &goal, Some(1))?.into_iter().next() else {
            return Err(Rejection::NoDefaultMove(own));
        };

        debug!(
            ?moves,
            "accepted with players {own} and {opponent}, default move {default_move}"
        );
        self.game.set_extracted(moves, (own, opponent));
        Ok(Accepted {
            session,
            default_move,
        })
    }

    /// Turns a rejection into repairs of the programs that were generated.
    ///
    /// Nothing can be repaired when no program was generated, or when the engine itself is
    /// unavailable.
    fn plan_repairs(&self, rejection: &Rejection) -> Vec<Repair> {
        if matches!(rejection, Rejection::EngineUnavailable(_)) {
            return vec![];
        }

        let mut generated = vec![];
        if self.game_described {
            generated.push((Target::GameRules, self.game.rules().unwrap_or_default()));
        }
        if self.strategy_description.is_some() {
            generated.push((
                Target::StrategyRules,
                self.strategy_program.as_deref().unwrap_or_default(),
            ));
        }
        let Some(&(first, _)) = generated.first() else {
            return vec![];
        };

        if let Rejection::Diagnostics(messages) = rejection {
            let routed: Vec<Repair> = generated
                .iter()
                .filter_map(|(target, text)| {
                    let current = retain_current(messages.clone(), text);
                    (!current.is_empty()).then(|| Repair {
                        target: *target,
                        report: feedback_report(&current),
                    })
                })
                .collect();
            if !routed.is_empty() {
                return routed;
            }
        }

        vec![Repair {
            target: first,
            report: rejection.to_string(),
        }]
    }
}

fn query_all(
    session: &mut ReasoningSession,
    goal: &str,
    count: Option<usize>,
) -> Result<Vec<String>, Rejection> {
    session
        .get_variable_values(goal, count)
        .map(|values| values.iter().map(term_text).collect())
        .ok_or_else(|| Rejection::QueryFailed(goal.to_string()))
}
