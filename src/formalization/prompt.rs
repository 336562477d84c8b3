//! Prompt templates and the response contract of the generator.

use std::{fs, path::Path, sync::LazyLock};

use anyhow::Context;
use regex::Regex;
use thiserror::Error;

/// Replaced by the natural-language game description.
pub const GAME_DESCRIPTION: &str = "game_description";
/// Replaced by the program being repaired.
pub const CODE: &str = "code";
/// Replaced by the feedback report.
pub const MESSAGES: &str = "messages";
/// Replaced by the natural-language strategy description.
pub const STRATEGY_DESCRIPTION: &str = "strategy_description";

static DELIMITED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^@([^@]+)@").expect("delimiter pattern"));

/// The generator ignored the `@...@` output contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no @-delimited program found in the response")]
pub struct ExtractionError;

/// Returns the text of the first `@...@` block opening at the start of a line.
pub fn extract_program(response: &str) -> Result<String, ExtractionError> {
    DELIMITED
        .captures(response)
        .map(|caps| caps[1].to_string())
        .ok_or(ExtractionError)
}

/// Substitutes every `{name}` placeholder of `template` with its value.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |prompt, (name, value)| {
            prompt.replace(&format!("{{{name}}}"), value)
        })
}

/// Templates used by the repair loop.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    /// First prompt for game rules, with a `{game_description}` placeholder.
    pub game: String,
    /// Repair prompt, with `{code}` and `{messages}` placeholders.
    pub feedback: String,
    /// First prompt for strategies, with a `{strategy_description}` placeholder.
    pub strategy: Option<String>,
}

impl PromptTemplates {
    /// Templates for game rules only.
    pub fn new(game: impl Into<String>, feedback: impl Into<String>) -> Self {
        Self {
            game: game.into(),
            feedback: feedback.into(),
            strategy: None,
        }
    }

    /// Adds the template used to formalize strategy descriptions.
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    /// Reads the templates from disk.
    pub fn from_files(
        game: impl AsRef<Path>,
        feedback: impl AsRef<Path>,
        strategy: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let read = |path: &Path| {
            fs::read_to_string(path).with_context(|| format!("reading template {path:?}"))
        };
        let mut templates = Self::new(read(game.as_ref())?, read(feedback.as_ref())?);
        if let Some(strategy) = strategy {
            templates = templates.with_strategy(read(strategy)?);
        }
        Ok(templates)
    }

    pub(crate) fn game_prompt(&self, description: &str) -> String {
        fill_template(&self.game, &[(GAME_DESCRIPTION, description)])
    }

    pub(crate) fn feedback_prompt(&self, code: &str, messages: &str) -> String {
        fill_template(&self.feedback, &[(CODE, code), (MESSAGES, messages)])
    }

    pub(crate) fn strategy_prompt(&self, description: &str) -> Option<String> {
        self.strategy
            .as_ref()
            .map(|template| fill_template(template, &[(STRATEGY_DESCRIPTION, description)]))
    }
}
