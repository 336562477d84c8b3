//! Text-generation backends.
//!
//! The repair loop only needs `prompt(text) -> text`. History retention is a property of the
//! backend chosen by the caller, not hidden state of the loop: a [`ChatCompletionsClient`] built
//! with `save_history` keeps every exchange and sends it back with the next prompt.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

/// Failures of a text-generation backend.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The request could not be sent or its body could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },
    /// The response does not contain any generated text.
    #[error("response has no content")]
    EmptyResponse,
    /// The backend is not usable as configured.
    #[error("backend misconfigured: {0}")]
    Configuration(String),
}

/// A text-generation backend.
pub trait TextGenerator: Send {
    /// Sends `instruction` and returns the generated text.
    fn prompt(&mut self, instruction: &str) -> Result<String, GenerationError>;
}

/// Creates one generator per agent, so conversation histories are never shared.
pub trait GeneratorFactory: Send + Sync {
    /// Returns a new generator with an empty history.
    fn create(&self) -> Result<Box<dyn TextGenerator>, GenerationError>;
}

/// Settings of an OpenAI-compatible chat-completions backend.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    save_history: bool,
    context: Option<String>,
    timeout: Duration,
}

impl ChatConfig {
    /// `gpt-4o` on the public endpoint, temperature 1.0, 1024 tokens, with history retention.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 1.0,
            max_tokens: 1024,
            save_history: true,
            context: None,
            timeout: Duration::from_secs(300),
        }
    }

    /// Reads `OPENAI_API_KEY` and, when set, `OPENAI_BASE_URL`.
    pub fn from_env() -> anyhow::Result<Self> {
        let Ok(api_key) = std::env::var("OPENAI_API_KEY") else {
            anyhow::bail!("OPENAI_API_KEY is not set");
        };
        let config = Self::new(api_key);
        Ok(match std::env::var("OPENAI_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => config.with_base_url(url.trim()),
            _ => config,
        })
    }

    /// Endpoint root, without the trailing `/chat/completions`.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Maximum number of generated tokens per prompt.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Keep or forget previous exchanges between prompts.
    pub fn with_save_history(mut self, value: bool) -> Self {
        self.save_history = value;
        self
    }

    /// System message sent at the start of every conversation.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// HTTP timeout per request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl GeneratorFactory for ChatConfig {
    fn create(&self) -> Result<Box<dyn TextGenerator>, GenerationError> {
        Ok(Box::new(ChatCompletionsClient::new(self.clone())?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Blocking client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsClient {
    http: reqwest::blocking::Client,
    config: ChatConfig,
    messages: Vec<ChatMessage>,
}

impl ChatCompletionsClient {
    /// Builds the HTTP client. No request is sent yet.
    pub fn new(config: ChatConfig) -> Result<Self, GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::Configuration("empty API key".to_string()));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;
        let mut client = Self {
            http,
            config,
            messages: vec![],
        };
        client.clear_context();
        Ok(client)
    }

    /// Forgets every exchange, keeping only the system context.
    pub fn clear_context(&mut self) {
        self.messages = match &self.config.context {
            Some(context) => vec![ChatMessage::new("system", context)],
            None => vec![],
        };
        debug!("conversation context cleared");
    }

    /// Name of the model prompted.
    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    /// Whether exchanges are kept between prompts.
    pub fn save_history(&self) -> bool {
        self.config.save_history
    }

    fn complete(&self) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: &self.messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response: ChatResponse = response.json()?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(GenerationError::EmptyResponse)
    }
}

impl TextGenerator for ChatCompletionsClient {
    fn prompt(&mut self, instruction: &str) -> Result<String, GenerationError> {
        debug!("prompting {}: {instruction}", self.config.model);
        if !self.config.save_history {
            self.clear_context();
        }
        self.messages.push(ChatMessage::new("user", instruction));

        match self.complete() {
            Ok(content) => {
                debug!("received response: {content}");
                if self.config.save_history {
                    self.messages.push(ChatMessage::new("assistant", &content));
                }
                Ok(content)
            }
            Err(e) => {
                error!("error while prompting {}: {e}", self.config.model);
                // an unanswered prompt must not stay in the history
                self.messages.pop();
                Err(e)
            }
        }
    }
}
