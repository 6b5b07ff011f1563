//! Language-model backends and fallback routing
//!
//! Provides:
//! - The `ModelBackend` seam and its typed per-attempt failures
//! - OpenAI-compatible, Anthropic and offline mock backends
//! - A process-wide registry with explicit init and teardown
//! - Ordered fallback routing with per-attempt timeouts

mod backends;
mod registry;
mod router;

pub use backends::{AnthropicBackend, MockBackend, MockReply, OpenAiChatBackend};
pub use registry::{ModelRegistry, ResolvedModel};
pub use router::{ModelAttempt, ModelResponse, ModelRouter, UNAVAILABLE_TEXT};

use async_trait::async_trait;
use std::time::Duration;

/// Why a single model attempt failed. Absorbed by the router, never surfaced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("upstream error {status}: {message}")]
    Upstream { status: u16, message: String },
}

impl ModelFailure {
    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            ModelFailure::Timeout(_) => "timeout",
            ModelFailure::Transport(_) => "transport",
            ModelFailure::Malformed(_) => "malformed",
            ModelFailure::RateLimited => "rate_limited",
            ModelFailure::Upstream { .. } => "upstream",
        }
    }
}

/// A generative model endpoint
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Name the backend is registered and reported under
    fn name(&self) -> &str;

    /// Produce a completion for `prompt`. `timeout` is advisory for the
    /// transport; the router enforces it independently.
    async fn invoke(&self, prompt: &str, timeout: Duration) -> Result<String, ModelFailure>;
}
