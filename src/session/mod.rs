//! Protocol bridge between agents and the reasoning engine.
//!
//! A [`ReasoningSession`] owns exactly one engine. Loading happens once, at construction: the
//! domain-independent program, the game rules and the strategy are each written to their own
//! temporary file and consulted separately, so a failure can be attributed to a fragment. The
//! session then checks that the required predicates exist and that no critical diagnostic was
//! emitted during the load window. The outcome is kept as a `valid` flag plus an optional trace.
//!
//! Temporary files only live for the duration of the load call.

use std::io::Write;
use std::path::Path;

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, error, instrument, warn};

pub mod engine;
pub mod swipl;
pub mod trace;

use engine::{Bindings, EngineError, ReasoningEngine};
use trace::{parse_trace, resolve_line, TraceMessage};

/// Predicates every loaded program must define, as `name/arity`.
pub const REQUIRED_PREDICATES: [&str; 5] = [
    "select/4",
    "initialise/2",
    "opposite_move/2",
    "finally/2",
    "possible/2",
];

/// The three program texts loaded into one session.
#[derive(Debug, Clone, Copy)]
pub struct ProgramFragments<'a> {
    /// Domain-independent program.
    pub solver: &'a str,
    /// Formal game rules.
    pub game: &'a str,
    /// Strategy program.
    pub strategy: &'a str,
}

impl<'a> ProgramFragments<'a> {
    fn labelled(&self) -> [(&'static str, &'a str); 3] {
        [
            ("solver", self.solver),
            ("game", self.game),
            ("strategy", self.strategy),
        ]
    }
}

#[derive(Debug)]
struct LoadedFragment {
    label: String,
    file_name: String,
    text: String,
}

/// One loaded program and the engine holding it.
pub struct ReasoningSession {
    engine: Box<dyn ReasoningEngine>,
    program: String,
    fragments: Vec<LoadedFragment>,
    valid: bool,
    trace: Option<String>,
    missing_predicates: Vec<String>,
}

impl std::fmt::Debug for ReasoningSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasoningSession")
            .field("valid", &self.valid)
            .field("trace", &self.trace)
            .field("missing_predicates", &self.missing_predicates)
            .finish_non_exhaustive()
    }
}

impl ReasoningSession {
    /// Loads `fragments` into `engine` and validates the result against
    /// [`REQUIRED_PREDICATES`].
    ///
    /// Never fails: problems are recorded in [`is_valid`](Self::is_valid),
    /// [`trace`](Self::trace) and [`missing_predicates`](Self::missing_predicates).
    pub fn load(engine: Box<dyn ReasoningEngine>, fragments: ProgramFragments<'_>) -> Self {
        Self::load_with(engine, fragments, &REQUIRED_PREDICATES)
    }

    /// Same as [`load`](Self::load) with a custom set of required predicates.
    #[instrument(skip_all)]
    pub fn load_with(
        engine: Box<dyn ReasoningEngine>,
        fragments: ProgramFragments<'_>,
        predicates: &[&str],
    ) -> Self {
        let mut session = ReasoningSession {
            engine,
            program: String::new(),
            fragments: vec![],
            valid: false,
            trace: None,
            missing_predicates: vec![],
        };
        session.consult_and_validate(fragments, predicates);
        session
    }

    fn consult_and_validate(&mut self, fragments: ProgramFragments<'_>, predicates: &[&str]) {
        // anything emitted before the load window does not belong to this program
        let stale = self.engine.drain_diagnostics();
        if !stale.is_empty() {
            debug!(?stale, "discarding diagnostics emitted before load");
        }

        self.program = format!("{}{}{}", fragments.solver, fragments.game, fragments.strategy);

        let artifacts = match write_artifacts(&fragments.labelled()) {
            Ok(artifacts) => artifacts,
            Err(e) => {
                error!("could not write program fragments: {e}");
                self.trace = Some(e.to_string());
                return;
            }
        };

        let mut correct = true;
        for ((label, text), file) in fragments.labelled().into_iter().zip(&artifacts) {
            self.fragments.push(LoadedFragment {
                label: label.to_string(),
                file_name: file_name_of(file.path()),
                text: text.to_string(),
            });
            match self.engine.consult(file.path()) {
                Ok(true) => debug!("consulted {label} from {}", file.path().display()),
                Ok(false) => {
                    error!("failed to consult {label} from {}", file.path().display());
                    correct = false;
                    break;
                }
                Err(e) => {
                    error!("engine error while consulting {label}: {e}");
                    let mut lines = self.engine.drain_diagnostics();
                    lines.push(e.to_string());
                    self.trace = Some(lines.join("\n"));
                    correct = false;
                    break;
                }
            }
        }

        if correct {
            match self.find_missing(predicates) {
                Ok(missing) if missing.is_empty() => {}
                Ok(missing) => {
                    debug!(?missing, "missing predicates");
                    self.missing_predicates = missing;
                    correct = false;
                }
                Err(e) => {
                    error!("engine error while validating predicates: {e}");
                    self.trace = Some(e.to_string());
                    correct = false;
                }
            }
        }

        if correct {
            let diagnostics = self.engine.drain_diagnostics();
            if !diagnostics.is_empty() {
                let trace = diagnostics.join("\n");
                error!("engine diagnostics during load: {trace}");
                self.trace = Some(trace);
                correct = false;
            }
        }

        // `artifacts` is dropped here, which removes the temporary files
        drop(artifacts);
        self.valid = correct;
    }

    fn find_missing(&mut self, predicates: &[&str]) -> Result<Vec<String>, EngineError> {
        let mut missing = vec![];
        for predicate in predicates {
            if !self.engine.run(&format!("current_predicate({predicate})"))? {
                missing.push(predicate.to_string());
            }
        }
        Ok(missing)
    }

    /// Consults one more program into the already loaded session.
    ///
    /// Diagnostics emitted while loading it are logged, not recorded.
    pub fn consult_program(&mut self, label: &str, text: &str) -> bool {
        let artifacts = match write_artifacts(&[(label, text)]) {
            Ok(artifacts) => artifacts,
            Err(e) => {
                error!("could not write {label}: {e}");
                return false;
            }
        };
        let Some(file) = artifacts.first() else {
            return false;
        };

        let consulted = match self.engine.consult(file.path()) {
            Ok(consulted) => consulted,
            Err(e) => {
                error!("engine error while consulting {label}: {e}");
                false
            }
        };
        let diagnostics = self.engine.drain_diagnostics();
        if !diagnostics.is_empty() {
            warn!("diagnostics while consulting {label}: {}", diagnostics.join("\n"));
        }
        consulted
    }

    /// Evaluates `goal` and returns the first bound value of each solution, keeping at most
    /// `count` of them.
    ///
    /// `Some(vec![])` means the goal has no solution. `None` means the engine failed, and the
    /// error has been logged.
    pub fn get_variable_values(&mut self, goal: &str, count: Option<usize>) -> Option<Vec<Value>> {
        debug!("querying {goal}");
        match self.engine.solutions(goal, count) {
            Ok(solutions) => {
                let mut values = first_values(solutions);
                if let Some(count) = count {
                    values.truncate(count);
                }
                debug!(?values, "extracted values");
                Some(values)
            }
            Err(e) => {
                error!("error querying '{goal}': {e}");
                None
            }
        }
    }

    /// True when `goal` has at least one solution. `None` on engine failure.
    pub fn holds(&mut self, goal: &str) -> Option<bool> {
        match self.engine.solutions(goal, Some(1)) {
            Ok(solutions) => Some(!solutions.is_empty()),
            Err(e) => {
                error!("error querying '{goal}': {e}");
                None
            }
        }
    }

    /// Evaluates `goal` for its side effects.
    ///
    /// A goal that simply fails is `Ok(false)`; only protocol errors are `Err`.
    pub fn apply_predicate(&mut self, goal: &str) -> Result<bool, EngineError> {
        debug!("applying {goal}");
        let applied = self.engine.run(goal).inspect_err(|e| {
            error!("failed to apply '{goal}': {e}");
        })?;
        if !applied {
            debug!("'{goal}' failed");
        }
        Ok(applied)
    }

    /// Parses the trace and resolves every message against the fragment it points to, or
    /// against the whole program when the file is not one of this session's fragments.
    pub fn resolve_trace(&self) -> Vec<TraceMessage> {
        let Some(trace) = &self.trace else {
            return vec![];
        };
        parse_trace(trace)
            .into_iter()
            .map(|mut message| {
                let reported = file_name_of(Path::new(&message.file));
                let text = self
                    .fragments
                    .iter()
                    .find(|fragment| fragment.file_name == reported)
                    .map_or(self.program.as_str(), |fragment| fragment.text.as_str());
                resolve_line(&mut message, text);
                message
            })
            .collect()
    }

    /// Whether loading succeeded.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Diagnostic text captured while loading, if any.
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    /// Required predicates the loaded program does not define.
    pub fn missing_predicates(&self) -> &[String] {
        &self.missing_predicates
    }

    /// Concatenation of the loaded fragments.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Text of the fragment loaded under `label` (`solver`, `game` or `strategy`).
    pub fn fragment(&self, label: &str) -> Option<&str> {
        self.fragments
            .iter()
            .find(|fragment| fragment.label == label)
            .map(|fragment| fragment.text.as_str())
    }
}

fn write_artifacts(fragments: &[(&str, &str)]) -> std::io::Result<Vec<NamedTempFile>> {
    fragments
        .iter()
        .map(|(label, text)| {
            let mut file = tempfile::Builder::new()
                .prefix(&format!("{label}_"))
                .suffix(".pl")
                .tempfile()?;
            file.write_all(text.as_bytes())?;
            file.flush()?;
            Ok(file)
        })
        .collect()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn first_values(solutions: Vec<Bindings>) -> Vec<Value> {
    solutions
        .into_iter()
        .filter_map(|bindings| bindings.into_iter().next().map(|(_, value)| value))
        .collect()
}
