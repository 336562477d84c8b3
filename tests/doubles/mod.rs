#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use formal_tournament::{
    formalization::prompt::PromptTemplates,
    generation::{GenerationError, GeneratorFactory, TextGenerator},
    prelude::Collaborators,
    session::engine::{Bindings, EngineError, EngineFactory, ReasoningEngine},
};
use regex::Regex;
use serde_json::{json, Value};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Defines every required predicate except the ones a test leaves out on purpose.
pub const SOLVER: &str = "\
select(P, H, S, M) :- strategy(P, H, S, M).
initialise(F, S) :- retractall(F), assertz(F).
opposite_move(a, b).
finally(G, S) :- holds(G, S).
";

pub const SOLVER_WITHOUT_SELECT: &str = "\
initialise(F, S) :- retractall(F), assertz(F).
opposite_move(a, b).
finally(G, S) :- holds(G, S).
";

pub const PD_RULES: &str = "\
possible(move(P, M), s0) :- member(M, ['C', 'D']).
holds(player(p1), s0).
holds(player(p2), s0).
initially(default_move(P, 'C'), s0).
";

/// What one engine has seen.
#[derive(Debug, Default)]
pub struct World {
    pub consulted: Vec<String>,
    pub consulted_paths: Vec<PathBuf>,
    pub applied: Vec<String>,
    pub calls: HashMap<String, usize>,
}

impl World {
    pub fn program(&self) -> String {
        self.consulted.concat()
    }

    pub fn defines(&self, name: &str) -> bool {
        self.consulted
            .iter()
            .any(|text| text.contains(&format!("{name}(")))
    }

    pub fn calls(&self, goal: &str) -> usize {
        self.calls.get(goal).copied().unwrap_or(0)
    }

    /// Calls of every goal starting with `prefix`.
    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.calls
            .iter()
            .filter(|(goal, _)| goal.starts_with(prefix))
            .map(|(_, n)| n)
            .sum()
    }
}

pub type Responder = dyn Fn(&World, &str) -> Result<Vec<Bindings>, EngineError> + Send + Sync;
pub type Diagnose = dyn Fn(&Path, &str) -> Vec<String> + Send + Sync;

pub fn yes() -> Result<Vec<Bindings>, EngineError> {
    Ok(vec![vec![]])
}

pub fn no() -> Result<Vec<Bindings>, EngineError> {
    Ok(vec![])
}

pub fn values(variable: &str, values: &[Value]) -> Result<Vec<Bindings>, EngineError> {
    Ok(values
        .iter()
        .map(|value| vec![(variable.to_string(), value.clone())])
        .collect())
}

pub struct ScriptedEngine {
    world: Arc<Mutex<World>>,
    responder: Arc<Responder>,
    diagnose: Arc<Diagnose>,
    pending: Vec<String>,
}

impl ScriptedEngine {
    fn answer(&mut self, goal: &str) -> Result<Vec<Bindings>, EngineError> {
        let mut world = self.world.lock().unwrap();
        *world.calls.entry(goal.to_string()).or_default() += 1;
        (self.responder)(&world, goal)
    }
}

impl ReasoningEngine for ScriptedEngine {
    fn consult(&mut self, path: &Path) -> Result<bool, EngineError> {
        let text = std::fs::read_to_string(path)?;
        self.pending.extend((self.diagnose)(path, &text));
        let mut world = self.world.lock().unwrap();
        world.consulted.push(text);
        world.consulted_paths.push(path.to_path_buf());
        Ok(true)
    }

    fn run(&mut self, goal: &str) -> Result<bool, EngineError> {
        if let Some(indicator) = goal
            .strip_prefix("current_predicate(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let name = indicator.split('/').next().unwrap_or_default();
            return Ok(self.world.lock().unwrap().defines(name));
        }
        self.world.lock().unwrap().applied.push(goal.to_string());
        Ok(!self.answer(goal)?.is_empty())
    }

    fn solutions(
        &mut self,
        goal: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Bindings>, EngineError> {
        let mut solutions = self.answer(goal)?;
        if let Some(limit) = limit {
            solutions.truncate(limit);
        }
        Ok(solutions)
    }

    fn drain_diagnostics(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }
}

/// Spawns scripted engines and keeps every world they build.
#[derive(Clone)]
pub struct ScriptedEngines {
    responder: Arc<Responder>,
    diagnose: Arc<Diagnose>,
    worlds: Arc<Mutex<Vec<Arc<Mutex<World>>>>>,
    unavailable: bool,
}

impl ScriptedEngines {
    pub fn new(
        responder: impl Fn(&World, &str) -> Result<Vec<Bindings>, EngineError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            diagnose: Arc::new(|_, _| vec![]),
            worlds: Arc::default(),
            unavailable: false,
        }
    }

    /// Diagnostics emitted when a file is consulted, e.g. [`syntax_errors`].
    pub fn with_diagnostics(
        mut self,
        diagnose: impl Fn(&Path, &str) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.diagnose = Arc::new(diagnose);
        self
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new(|_, _| no())
        }
    }

    pub fn worlds(&self) -> Vec<Arc<Mutex<World>>> {
        self.worlds.lock().unwrap().clone()
    }

    pub fn spawned(&self) -> usize {
        self.worlds.lock().unwrap().len()
    }
}

impl EngineFactory for ScriptedEngines {
    fn spawn(&self) -> Result<Box<dyn ReasoningEngine>, EngineError> {
        if self.unavailable {
            return Err(EngineError::Spawn("scripted engine disabled".to_string()));
        }
        let world = Arc::new(Mutex::new(World::default()));
        self.worlds.lock().unwrap().push(Arc::clone(&world));
        Ok(Box::new(ScriptedEngine {
            world,
            responder: Arc::clone(&self.responder),
            diagnose: Arc::clone(&self.diagnose),
            pending: vec![],
        }))
    }
}

/// Reports a syntax error on every consulted line containing `broken`.
pub fn syntax_errors(path: &Path, text: &str) -> Vec<String> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| line.contains("broken"))
        .map(|(index, _)| {
            format!(
                "ERROR: {}:{}:1: Syntax error: Operator expected",
                path.display(),
                index + 1
            )
        })
        .collect()
}

fn pd_payoff(own: &str, opponent: &str) -> Option<i64> {
    match (own, opponent) {
        ("C", "C") => Some(3),
        ("C", "D") => Some(0),
        ("D", "C") => Some(5),
        ("D", "D") => Some(1),
        _ => None,
    }
}

/// Answers like a prisoner's dilemma loaded with one of the strategies `always_c`, `always_d`,
/// `flaky_after_<n>` (which stops selecting after `n` moves) or `unpaid_after_<n>` (which stops
/// receiving payoffs after `n` rounds).
pub fn prisoners_dilemma(world: &World, goal: &str) -> Result<Vec<Bindings>, EngineError> {
    let program = world.program();
    if goal == "possible(move(_,X), s0)" {
        return if program.contains("possible(") {
            values("X", &[json!("C"), json!("D")])
        } else {
            no()
        };
    }
    if goal == "holds(player(N), s0)" {
        return if program.contains("holds(player(") {
            values("N", &[json!("p1"), json!("p2")])
        } else {
            no()
        };
    }
    if goal.starts_with("initially(default_move(") {
        return if program.contains("initially(default_move(") {
            values("X", &[json!("C")])
        } else {
            no()
        };
    }
    if goal.starts_with("select(") {
        let played = world.calls_starting_with("select(");
        if let Some(limit) = limit_after(&program, "flaky") {
            if played > limit {
                return no();
            }
        }
        let selected = if program.contains("always_d") { "D" } else { "C" };
        return values("M", &[json!(selected)]);
    }
    if goal.starts_with("finally(goal(") {
        let paid = world.calls_starting_with("finally(");
        if let Some(limit) = limit_after(&program, "unpaid") {
            if paid > limit {
                return no();
            }
        }
        return match moves_in(goal).as_slice() {
            [own, opponent] => match pd_payoff(own, opponent) {
                Some(payoff) => values("U", &[json!(payoff)]),
                None => no(),
            },
            _ => no(),
        };
    }
    if goal.starts_with("initialise(") {
        return yes();
    }
    no()
}

fn limit_after(program: &str, behaviour: &str) -> Option<usize> {
    let re = Regex::new(&format!(r"{behaviour}_after_(\d+)")).unwrap();
    re.captures(program).and_then(|caps| caps[1].parse().ok())
}

/// Raises an engine exception for every query containing `trigger`, and otherwise answers like
/// [`prisoners_dilemma`].
pub fn raising_on(
    trigger: &'static str,
) -> impl Fn(&World, &str) -> Result<Vec<Bindings>, EngineError> + Send + Sync + 'static {
    move |world, goal| {
        if goal.contains(trigger) {
            Err(EngineError::Exception(format!("error(existence_error, {trigger})")))
        } else {
            prisoners_dilemma(world, goal)
        }
    }
}

/// Moves of a `do(move(P, M), ...)` situation, outermost first.
pub fn moves_in(goal: &str) -> Vec<String> {
    let re = Regex::new(r"move\('[^']*', '([^']*)'\)").unwrap();
    re.captures_iter(goal).map(|caps| caps[1].to_string()).collect()
}

pub fn quoted_atoms(goal: &str) -> Vec<String> {
    let re = Regex::new(r"'([^']*)'").unwrap();
    re.captures_iter(goal).map(|caps| caps[1].to_string()).collect()
}

type Reply = dyn Fn(usize, &str) -> Result<String, GenerationError> + Send + Sync;

/// Replies computed from the prompt and the number of prompts sent before it, across every
/// generator created.
#[derive(Clone)]
pub struct ScriptedGenerators {
    reply: Arc<Reply>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGenerators {
    pub fn new(
        reply: impl Fn(usize, &str) -> Result<String, GenerationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Arc::new(reply),
            calls: Arc::default(),
            prompts: Arc::default(),
        }
    }

    /// Never expected to be prompted.
    pub fn silent() -> Self {
        Self::new(|_, _| Err(GenerationError::EmptyResponse))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

struct ScriptedGenerator {
    shared: ScriptedGenerators,
}

impl TextGenerator for ScriptedGenerator {
    fn prompt(&mut self, instruction: &str) -> Result<String, GenerationError> {
        let n = self.shared.calls.fetch_add(1, Ordering::SeqCst);
        self.shared
            .prompts
            .lock()
            .unwrap()
            .push(instruction.to_string());
        (self.shared.reply)(n, instruction)
    }
}

impl GeneratorFactory for ScriptedGenerators {
    fn create(&self) -> Result<Box<dyn TextGenerator>, GenerationError> {
        Ok(Box::new(ScriptedGenerator {
            shared: self.clone(),
        }))
    }
}

/// Wraps a program the way the generator is instructed to.
pub fn delimited(program: &str) -> String {
    format!("Here is the program:\n@{program}@\n")
}

pub fn templates() -> PromptTemplates {
    PromptTemplates::new(
        "Formalize this game:\n{game_description}",
        "Fix this program:\n{code}\nProblems:\n{messages}",
    )
    .with_strategy("Formalize this strategy:\n{strategy_description}")
}

pub fn collaborators(
    engines: &ScriptedEngines,
    generators: &ScriptedGenerators,
    max_attempts: usize,
) -> Collaborators {
    Collaborators::new(
        SOLVER,
        templates(),
        Arc::new(engines.clone()),
        Arc::new(generators.clone()),
    )
    .with_max_attempts(max_attempts)
}

pub fn init_test_logger() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
