//! Model backend implementations

use super::{ModelBackend, ModelFailure};
use crate::config::ModelCandidateConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder().build().map_err(|e| AppError::Internal {
        message: format!("Failed to create HTTP client: {}", e),
    })
}

fn require_key(config: &ModelCandidateConfig) -> Result<String> {
    config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            AppError::configuration(format!(
                "models.candidates '{}' needs an api_key for provider '{}'",
                config.name, config.provider
            ))
        })
}

fn transport_failure(e: reqwest::Error, timeout: Duration) -> ModelFailure {
    if e.is_timeout() {
        ModelFailure::Timeout(timeout)
    } else {
        ModelFailure::Transport(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> std::result::Result<reqwest::Response, ModelFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ModelFailure::RateLimited);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ModelFailure::Upstream {
        status: status.as_u16(),
        message: body.chars().take(200).collect(),
    })
}

/// OpenAI-compatible chat completions endpoint
pub struct OpenAiChatBackend {
    client: reqwest::Client,
    name: String,
    model: String,
    endpoint: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatBackend {
    pub fn new(config: &ModelCandidateConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            name: config.name.clone(),
            model: config.model.clone(),
            endpoint: config.endpoint.clone().unwrap_or_else(|| OPENAI_CHAT_URL.to_string()),
            api_key: require_key(config)?,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ModelBackend for OpenAiChatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: &str, timeout: Duration) -> std::result::Result<String, ModelFailure> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are Counsel, a careful legal research assistant.",
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_failure(e, timeout))?;

        let parsed: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ModelFailure::Malformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelFailure::Malformed("no choices in response".to_string()))
    }
}

/// Anthropic Messages API
pub struct AnthropicBackend {
    client: reqwest::Client,
    name: String,
    model: String,
    endpoint: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicBackend {
    pub fn new(config: &ModelCandidateConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            name: config.name.clone(),
            model: config.model.clone(),
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| ANTHROPIC_MESSAGES_URL.to_string()),
            api_key: require_key(config)?,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ModelBackend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: &str, timeout: Duration) -> std::result::Result<String, ModelFailure> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_failure(e, timeout))?;

        let parsed: MessagesResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ModelFailure::Malformed(e.to_string()))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            return Err(ModelFailure::Malformed("no text blocks in response".to_string()));
        }
        Ok(text)
    }
}

/// What a `MockBackend` answers with
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A canned legal answer citing `[1]` when the prompt has sources
    Cited,
    /// Always this text
    Fixed(String),
    /// Always this failure
    Fail(ModelFailure),
}

/// Offline backend for development and tests
pub struct MockBackend {
    name: String,
    reply: MockReply,
    /// Delay before call `n`; calls past the end reuse the last entry
    delays: Vec<Duration>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl MockBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reply: MockReply::Cited,
            delays: Vec::new(),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn with_reply(mut self, reply: MockReply) -> Self {
        self.reply = reply;
        self
    }

    /// Sleep before answering, on every call
    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_delay_schedule(vec![delay])
    }

    /// Sleep before answering, on the first `calls` calls only
    pub fn with_delay_for_first(self, delay: Duration, calls: usize) -> Self {
        let mut delays = vec![delay; calls];
        delays.push(Duration::ZERO);
        self.with_delay_schedule(delays)
    }

    /// Per-call delays in call order
    pub fn with_delay_schedule(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    /// Number of invocations started so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompt of the most recent invocation
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|last| last.clone())
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: &str, _timeout: Duration) -> std::result::Result<String, ModelFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }

        let delay = self.delays.get(call).or(self.delays.last()).copied().unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match &self.reply {
            MockReply::Fixed(text) => Ok(text.clone()),
            MockReply::Fail(failure) => Err(failure.clone()),
            MockReply::Cited if prompt.contains("\n[1] ") => Ok(
                "Based on the legal context provided, the governing provision is set out in [1]. \
                Consult an advocate before acting on this summary.\n\n\
                [Mock response - no model API key configured]"
                    .to_string(),
            ),
            MockReply::Cited => Ok(
                "The available legal sources do not address this query directly. \
                Consult an advocate for advice on your circumstances.\n\n\
                [Mock response - no model API key configured]"
                    .to_string(),
            ),
        }
    }
}
