//! Offline cross-check of persisted agents against ground-truth payoff matrices.
//!
//! For every agent with status `correct`, three checks are made:
//!
//! - its total payoff must equal the instance's target payoff;
//! - if it does, the recorded payoff sequence must match the payoffs of the family's canonical
//!   action cycle, either as is or rotated by two cells (the opponent started from the other
//!   default move);
//! - its rules, loaded next to the family's structural validator, must accept the instance's
//!   normalized matrix.
//!
//! The final verdict is the conjunction of the sequence and constraint checks. Agents with any
//! other status fail every check.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    agent::AgentStatus,
    session::{
        engine::{term_number, EngineFactory},
        ProgramFragments, ReasoningSession,
    },
    snapshot::AgentSnapshot,
};

pub mod family;

use family::{GameFamily, PayoffMatrix};

/// Verdict for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationRow {
    /// Game instance, e.g. `pd_canonic_1.txt`.
    pub filename: String,
    /// Agent name.
    pub agent_name: String,
    /// Status recorded for the agent.
    pub status: AgentStatus,
    /// Total payoff and payoff sequence check.
    pub tournament: bool,
    /// Structural check of the rules.
    pub constraints: bool,
    /// `tournament && constraints`.
    pub final_verdict: bool,
}

/// Which form of the action cycle a payoff sequence matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceMatch {
    /// The canonical cycle.
    Canonical,
    /// The cycle rotated by two cells.
    Rotated,
    /// Neither.
    Mismatch,
}

/// Same length and every recorded payoff, rounded, equal to its target.
pub fn compare_sequences(actual: &[f64], target: &[f64]) -> bool {
    actual.len() == target.len()
        && actual
            .iter()
            .zip(target)
            .all(|(actual, target)| actual.round() == *target)
}

/// Validates persisted agents of many game instances.
pub struct Validator {
    engines: Arc<dyn EngineFactory>,
    solver: String,
    strategy: String,
    matrices: HashMap<String, PayoffMatrix>,
    target_payoffs: HashMap<String, f64>,
    validators: HashMap<String, String>,
    reference_program: Option<String>,
}

impl Validator {
    /// `solver` and `strategy` are loaded with every rule program checked. `validators` maps a
    /// family code to its structural validator program.
    pub fn new(
        engines: Arc<dyn EngineFactory>,
        solver: impl Into<String>,
        strategy: impl Into<String>,
        matrices: HashMap<String, PayoffMatrix>,
        target_payoffs: HashMap<String, f64>,
        validators: HashMap<String, String>,
    ) -> Self {
        Self {
            engines,
            solver: solver.into(),
            strategy: strategy.into(),
            matrices,
            target_payoffs,
            validators,
            reference_program: None,
        }
    }

    /// Checks payoff sequences against a general agent program loaded with the instance's
    /// ground-truth matrix, instead of the agent's own rules.
    pub fn with_reference_program(mut self, program: impl Into<String>) -> Self {
        self.reference_program = Some(program.into());
        self
    }

    /// Validates one agent of instance `filename`.
    #[instrument(skip(self, snapshot), fields(agent = %snapshot.name))]
    pub fn validate_agent(&self, filename: &str, snapshot: &AgentSnapshot) -> ValidationRow {
        let mut row = ValidationRow {
            filename: filename.to_string(),
            agent_name: snapshot.name.clone(),
            status: snapshot.status,
            tournament: false,
            constraints: false,
            final_verdict: false,
        };
        if snapshot.status != AgentStatus::Correct {
            info!("agent {} is {}", snapshot.name, snapshot.status);
            return row;
        }
        let Some(family) = GameFamily::from_instance(filename) else {
            warn!("no game family for instance {filename}");
            return row;
        };

        row.tournament = match self.target_payoffs.get(filename) {
            Some(target) if snapshot.total_payoff == *target => {
                let matched = self.sequence_match(family, filename, snapshot);
                info!("payoff sequence of {}: {matched:?}", snapshot.name);
                matched != SequenceMatch::Mismatch
            }
            Some(target) => {
                info!(
                    "agent {} did not achieve its target payoff ({} instead of {target})",
                    snapshot.name, snapshot.total_payoff
                );
                false
            }
            None => {
                warn!("no target payoff for instance {filename}");
                false
            }
        };

        row.constraints = match &snapshot.game_rules {
            Some(rules) => self.check_constraints(family, filename, rules),
            None => false,
        };
        row.final_verdict = row.tournament && row.constraints;
        row
    }

    /// Compares the recorded payoffs with the canonical cycle, then with the rotated one.
    pub fn sequence_match(
        &self,
        family: GameFamily,
        filename: &str,
        snapshot: &AgentSnapshot,
    ) -> SequenceMatch {
        let Some(mut session) = self.sequence_session(family, filename, snapshot) else {
            return SequenceMatch::Mismatch;
        };

        for (shift, matched) in [(0, SequenceMatch::Canonical), (2, SequenceMatch::Rotated)] {
            let mut target = vec![];
            for query in family.payoff_queries(shift) {
                match session.get_variable_values(&query, None) {
                    Some(values) => target.extend(values.iter().filter_map(term_number)),
                    None => return SequenceMatch::Mismatch,
                }
            }
            debug!(actual = ?snapshot.payoffs, ?target, "shift {shift}");
            if compare_sequences(&snapshot.payoffs, &target) {
                return matched;
            }
        }
        SequenceMatch::Mismatch
    }

    fn sequence_session(
        &self,
        family: GameFamily,
        filename: &str,
        snapshot: &AgentSnapshot,
    ) -> Option<ReasoningSession> {
        let rules = match (&self.reference_program, &snapshot.game_rules) {
            (Some(reference), _) => reference.as_str(),
            (None, Some(rules)) => rules.as_str(),
            (None, None) => return None,
        };
        let mut session = self.load(rules)?;

        if self.reference_program.is_some() {
            let Some(matrix) = self.matrices.get(filename) else {
                warn!("no matrix for instance {filename}");
                return None;
            };
            for assertion in matrix.assertions(family) {
                if !session.apply_predicate(&assertion).unwrap_or(false) {
                    warn!("could not assert {assertion}");
                    return None;
                }
            }
        }
        Some(session)
    }

    /// Loads `rules` with the family's structural validator and queries the normalized matrix.
    pub fn check_constraints(&self, family: GameFamily, filename: &str, rules: &str) -> bool {
        let Some(validator) = self.validators.get(family.code()) else {
            warn!("no structural validator for family {family}");
            return false;
        };
        let Some(goal) = self
            .matrices
            .get(filename)
            .and_then(|matrix| matrix.normalization_goal(family))
        else {
            warn!("no normalized matrix for instance {filename}");
            return false;
        };
        let Some(mut session) = self.load(rules) else {
            return false;
        };
        if !session.consult_program(family.code(), validator) {
            return false;
        }
        let satisfied = session.holds(&goal).unwrap_or(false);
        debug!("{goal}: {satisfied}");
        satisfied
    }

    fn load(&self, rules: &str) -> Option<ReasoningSession> {
        let engine = match self.engines.spawn() {
            Ok(engine) => engine,
            Err(e) => {
                warn!("could not start the reasoning engine: {e}");
                return None;
            }
        };
        let session = ReasoningSession::load(
            engine,
            ProgramFragments {
                solver: &self.solver,
                game: rules,
                strategy: &self.strategy,
            },
        );
        if !session.is_valid() {
            debug!("checked program did not load cleanly");
        }
        Some(session)
    }

    /// Validates every `<instance>/agent_*.json` under `agents_dir`.
    ///
    /// Instances whose family has no structural validator are skipped.
    pub fn validate_dir(&self, agents_dir: impl AsRef<Path>) -> anyhow::Result<Vec<ValidationRow>> {
        let agents_dir = agents_dir.as_ref();
        let mut rows = vec![];
        for instance_dir in sorted_entries(agents_dir)? {
            if !instance_dir.is_dir() {
                continue;
            }
            let instance = file_name(&instance_dir);
            let known = GameFamily::from_instance(&instance)
                .is_some_and(|family| self.validators.contains_key(family.code()));
            if !known {
                info!("skipping instance {instance}");
                continue;
            }
            let filename = instance_filename(&instance);

            for path in sorted_entries(&instance_dir)? {
                let name = file_name(&path);
                let Some(agent_name) = name
                    .strip_prefix("agent_")
                    .and_then(|rest| rest.strip_suffix(".json"))
                else {
                    continue;
                };
                let snapshot = AgentSnapshot::load_json(&path)?;
                let mut row = self.validate_agent(&filename, &snapshot);
                row.agent_name = agent_name.to_string();
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

/// `<first three '_'-separated parts>.txt`, the instance file a directory was made from.
pub fn instance_filename(instance: &str) -> String {
    let parts: Vec<&str> = instance.split('_').take(3).collect();
    format!("{}.txt", parts.join("_"))
}

/// Reads `<family>.pl` files, keyed by file stem.
pub fn validators_from_dir(dir: impl AsRef<Path>) -> anyhow::Result<HashMap<String, String>> {
    let mut validators = HashMap::new();
    for path in sorted_entries(dir.as_ref())? {
        if !path.is_file() || !path.extension().is_some_and(|ext| ext == "pl") {
            continue;
        }
        let code = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let program =
            std::fs::read_to_string(&path).with_context(|| format!("reading {path:?}"))?;
        validators.insert(code, program);
    }
    Ok(validators)
}

/// Reads a JSON object mapping instance file names to ground-truth matrices.
pub fn load_matrices(path: impl AsRef<Path>) -> anyhow::Result<HashMap<String, PayoffMatrix>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?;
    serde_json::from_str(&json).with_context(|| format!("parsing matrices {path:?}"))
}

/// Reads a JSON object mapping instance file names to target payoff sums.
pub fn load_target_payoffs(path: impl AsRef<Path>) -> anyhow::Result<HashMap<String, f64>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?;
    serde_json::from_str(&json).with_context(|| format!("parsing target payoffs {path:?}"))
}

fn sorted_entries(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("'{dir:?}' is not a valid directory");
    }
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading {dir:?}"))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .collect::<Vec<_>>();
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
