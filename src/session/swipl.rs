//! SWI-Prolog backend speaking the Machine Query Interface (MQI).
//!
//! Every [`SwiplMqi`] owns its own `swipl` process. The process is launched with `mqi_start`,
//! prints its port and password on stdout, and then answers framed requests over a local TCP
//! connection:
//!
//! ```text
//! <byte length>.\n<message>.\n
//! ```
//!
//! where the byte length covers the message including its trailing `.\n`. Answers are JSON
//! encoded terms: `true([[X = value, ...], ...])`, `false` or `exception(Term)`.
//!
//! Anything the engine prints on stderr (load warnings and errors in particular) is forwarded by
//! a reader thread and made available through [`ReasoningEngine::drain_diagnostics`].

use std::{
    io::{BufRead, BufReader, Write},
    net::{Ipv4Addr, SocketAddrV4, TcpStream},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread,
    time::Duration,
};

use serde_json::Value;
use tracing::{debug, trace, warn};

use super::engine::{Bindings, EngineError, EngineFactory, ReasoningEngine};

/// How to launch SWI-Prolog.
#[derive(Debug, Clone)]
pub struct SwiplConfig {
    program: PathBuf,
    settle: Duration,
}

impl SwiplConfig {
    /// `swipl` from the `PATH`, with a 50ms diagnostic settle window.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("swipl"),
            settle: Duration::from_millis(50),
        }
    }

    /// Reads the executable from `SWIPL_PATH`, falling back to [`SwiplConfig::new`].
    pub fn from_env() -> Self {
        let config = Self::new();
        match std::env::var("SWIPL_PATH") {
            Ok(path) if !path.trim().is_empty() => config.with_program(path.trim()),
            _ => config,
        }
    }

    /// Path to the `swipl` executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// How long to wait for late stderr lines when draining diagnostics.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

impl Default for SwiplConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for SwiplConfig {
    fn spawn(&self) -> Result<Box<dyn ReasoningEngine>, EngineError> {
        Ok(Box::new(SwiplMqi::launch(self)?))
    }
}

/// A connected MQI session with its own `swipl` process.
pub struct SwiplMqi {
    child: Child,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    diagnostics: Receiver<String>,
    settle: Duration,
}

impl SwiplMqi {
    /// Launches `swipl`, connects to it and authenticates.
    pub fn launch(config: &SwiplConfig) -> Result<Self, EngineError> {
        let mut child = Command::new(&config.program)
            .args([
                "--quiet",
                "-g",
                "mqi_start",
                "-t",
                "halt",
                "--",
                "--write_connection_values=true",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{}: {e}", config.program.display())))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            return Err(EngineError::Spawn("engine pipes unavailable".to_string()));
        };

        let (sender, diagnostics) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                if line.trim().is_empty() {
                    continue;
                }
                trace!("swipl stderr: {line}");
                if sender.send(line).is_err() {
                    break;
                }
            }
        });

        let mut stdout = BufReader::new(stdout);
        let connection = read_connection_values(&mut stdout);
        let (port, password) = match connection {
            Ok(values) => values,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };
        // keep the pipe drained so the engine never blocks on a full stdout
        thread::spawn(move || {
            for line in stdout.lines().map_while(Result::ok) {
                trace!("swipl stdout: {line}");
            }
        });

        let connect = || -> Result<(BufReader<TcpStream>, TcpStream), EngineError> {
            let stream = TcpStream::connect(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))?;
            stream.set_nodelay(true)?;
            let reader = BufReader::new(stream.try_clone()?);
            Ok((reader, stream))
        };
        let (reader, writer) = match connect() {
            Ok(pair) => pair,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Spawn(format!("could not connect on port {port}: {e}")));
            }
        };

        let mut engine = SwiplMqi {
            child,
            reader,
            writer,
            diagnostics,
            settle: config.settle,
        };
        // the handshake answers `true([[threads(...)]])`, which is not a binding list
        write_message(&mut engine.writer, &password)?;
        let reply = read_message(&mut engine.reader)?;
        if answer_functor(&reply).as_deref() == Some("true") {
            debug!("connected to swipl on port {port}");
            Ok(engine)
        } else {
            Err(EngineError::Spawn(format!("authentication refused: {reply}")))
        }
    }

    fn request(&mut self, message: &str) -> Result<Answer, EngineError> {
        write_message(&mut self.writer, message)?;
        let reply = read_message(&mut self.reader)?;
        trace!("swipl <- {message} -> {reply}");
        decode_answer(&reply)
    }

    fn expect_truth(&mut self, message: &str) -> Result<bool, EngineError> {
        match self.request(message)? {
            Answer::True(_) => Ok(true),
            Answer::False => Ok(false),
            Answer::Exception(e) => Err(EngineError::Exception(e)),
        }
    }
}

impl ReasoningEngine for SwiplMqi {
    fn consult(&mut self, path: &Path) -> Result<bool, EngineError> {
        let path = path.to_string_lossy().replace('\\', "/").replace('\'', "\\'");
        self.run(&format!("consult('{path}')"))
    }

    fn run(&mut self, goal: &str) -> Result<bool, EngineError> {
        let goal = strip_full_stop(goal);
        self.expect_truth(&format!("run(({goal}), _)"))
    }

    fn solutions(
        &mut self,
        goal: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Bindings>, EngineError> {
        let goal = strip_full_stop(goal);
        if !self.expect_truth(&format!("run_async(({goal}), _, false)"))? {
            return Ok(vec![]);
        }

        collect_async(|message| self.request(message), limit)
    }

    fn drain_diagnostics(&mut self) -> Vec<String> {
        let mut lines = vec![];
        loop {
            match self.diagnostics.recv_timeout(self.settle) {
                Ok(line) => lines.push(line),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        lines
    }
}

impl Drop for SwiplMqi {
    fn drop(&mut self) {
        if let Err(e) = write_message(&mut self.writer, "quit") {
            debug!("could not ask swipl to quit: {e}");
        }
        if let Err(e) = self.child.kill() {
            debug!("could not kill swipl: {e}");
        }
        if let Err(e) = self.child.wait() {
            warn!("could not reap swipl: {e}");
        }
    }
}

/// Reads the results of a `run_async` query one by one.
///
/// Once `limit` solutions are in, the query is cancelled and its remaining results are
/// discarded, so the next query starts on a clean connection.
fn collect_async<F>(mut request: F, limit: Option<usize>) -> Result<Vec<Bindings>, EngineError>
where
    F: FnMut(&str) -> Result<Answer, EngineError>,
{
    let mut solutions = vec![];
    loop {
        if let Some(limit) = limit.filter(|&limit| solutions.len() >= limit) {
            solutions.truncate(limit);
            cancel_async(request)?;
            return Ok(solutions);
        }
        match request("async_result(_)")? {
            Answer::True(mut batch) => solutions.append(&mut batch),
            Answer::False => break,
            Answer::Exception(e) if e == "no_more_results" => break,
            Answer::Exception(e) => return Err(EngineError::Exception(e)),
        }
    }
    Ok(solutions)
}

fn cancel_async<F>(mut request: F) -> Result<(), EngineError>
where
    F: FnMut(&str) -> Result<Answer, EngineError>,
{
    match request("cancel_async")? {
        Answer::Exception(e) if e == "no_query" => return Ok(()),
        Answer::Exception(e) => warn!("cancel_async raised {e}"),
        Answer::True(_) | Answer::False => {}
    }
    // the cancelled goal still reports how it ended
    loop {
        match request("async_result(_)")? {
            Answer::True(_) => continue,
            Answer::False | Answer::Exception(_) => return Ok(()),
        }
    }
}

fn read_connection_values<R: BufRead>(stdout: &mut R) -> Result<(u16, String), EngineError> {
    let mut port = String::new();
    let mut password = String::new();
    stdout.read_line(&mut port)?;
    stdout.read_line(&mut password)?;
    let port = port
        .trim()
        .parse()
        .map_err(|_| EngineError::Spawn(format!("invalid port announced: {port:?}")))?;
    let password = password.trim().to_string();
    if password.is_empty() {
        return Err(EngineError::Spawn("no password announced".to_string()));
    }
    Ok((port, password))
}

fn strip_full_stop(goal: &str) -> &str {
    let goal = goal.trim();
    goal.strip_suffix('.').unwrap_or(goal).trim_end()
}

/// Writes one framed message. A terminating `.` is added when missing.
pub fn write_message<W: Write>(writer: &mut W, message: &str) -> std::io::Result<()> {
    let message = message.trim();
    let body = if message.ends_with('.') {
        format!("{message}\n")
    } else {
        format!("{message}.\n")
    };
    write!(writer, "{}.\n{body}", body.len())?;
    writer.flush()
}

/// Reads one framed message and returns it without its trailing `.\n`.
pub fn read_message<R: BufRead>(reader: &mut R) -> Result<String, EngineError> {
    let mut header = String::new();
    if reader.read_line(&mut header)? == 0 {
        return Err(EngineError::Protocol("connection closed".to_string()));
    }
    let length: usize = header
        .trim()
        .strip_suffix('.')
        .and_then(|len| len.parse().ok())
        .ok_or_else(|| EngineError::Protocol(format!("invalid frame header {header:?}")))?;

    let mut body = vec![0; length];
    reader.read_exact(&mut body)?;
    let body = String::from_utf8(body)
        .map_err(|_| EngineError::Protocol("frame is not valid UTF-8".to_string()))?;
    let body = body.trim_end();
    Ok(body.strip_suffix('.').unwrap_or(body).to_string())
}

/// Decoded MQI answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// The goal succeeded, with one binding list per solution.
    True(Vec<Bindings>),
    /// The goal failed.
    False,
    /// The goal raised. Holds the exception term as text.
    Exception(String),
}

/// Decodes the JSON text of an MQI answer.
pub fn decode_answer(text: &str) -> Result<Answer, EngineError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| EngineError::Protocol(format!("{e} in {text:?}")))?;

    match &value {
        Value::String(atom) if atom == "false" => return Ok(Answer::False),
        Value::String(atom) if atom == "true" => return Ok(Answer::True(vec![vec![]])),
        _ => {}
    }

    let functor = value.get("functor").and_then(Value::as_str);
    let args = value.get("args").and_then(Value::as_array);
    match (functor, args) {
        (Some("true"), Some(args)) => {
            let solutions = args
                .first()
                .and_then(Value::as_array)
                .ok_or_else(|| EngineError::Protocol(format!("unexpected answer {text}")))?;
            solutions
                .iter()
                .map(decode_solution)
                .collect::<Result<Vec<_>, _>>()
                .map(Answer::True)
        }
        (Some("exception"), Some(args)) => Ok(Answer::Exception(
            args.first().map(exception_text).unwrap_or_default(),
        )),
        _ => Err(EngineError::Protocol(format!("unexpected answer {text}"))),
    }
}

fn answer_functor(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    match &value {
        Value::String(atom) => Some(atom.clone()),
        _ => value.get("functor").and_then(Value::as_str).map(str::to_string),
    }
}

fn decode_solution(solution: &Value) -> Result<Bindings, EngineError> {
    let Some(bindings) = solution.as_array() else {
        return Err(EngineError::Protocol(format!("unexpected solution {solution}")));
    };
    bindings
        .iter()
        .map(|binding| {
            let is_binding = binding.get("functor").and_then(Value::as_str) == Some("=");
            match binding.get("args").and_then(Value::as_array) {
                Some(args) if is_binding && args.len() == 2 => {
                    let name = args[0].as_str().unwrap_or_default().to_string();
                    Ok((name, args[1].clone()))
                }
                _ => Err(EngineError::Protocol(format!("unexpected binding {binding}"))),
            }
        })
        .collect()
}

fn exception_text(term: &Value) -> String {
    match term {
        Value::String(atom) => atom.clone(),
        other => other.to_string(),
    }
}
