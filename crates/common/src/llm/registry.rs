//! Process-wide model registry
//!
//! Built once at startup from configuration, shared by `Arc`, and torn
//! down explicitly on shutdown. After teardown every lookup fails.

use super::backends::{AnthropicBackend, MockBackend, OpenAiChatBackend};
use super::ModelBackend;
use crate::config::ModelsConfig;
use crate::errors::{AppError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A registered backend with its per-attempt timeout
#[derive(Clone)]
pub struct ResolvedModel {
    pub name: String,
    pub backend: Arc<dyn ModelBackend>,
    pub timeout: Duration,
}

#[derive(Default)]
struct RegistryState {
    models: HashMap<String, ResolvedModel>,
    /// Declaration order, used when callers pass no preference
    order: Vec<String>,
    closed: bool,
}

/// Registry of model backends keyed by candidate name
#[derive(Default)]
pub struct ModelRegistry {
    state: RwLock<RegistryState>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured candidate. Fails on unknown providers or
    /// missing credentials so misconfiguration surfaces at startup.
    pub fn from_config(config: &ModelsConfig) -> Result<Self> {
        let mut state = RegistryState::default();

        for candidate in &config.candidates {
            let backend: Arc<dyn ModelBackend> = match candidate.provider.as_str() {
                "openai" => Arc::new(OpenAiChatBackend::new(candidate)?),
                "anthropic" => Arc::new(AnthropicBackend::new(candidate)?),
                "mock" => Arc::new(MockBackend::new(candidate.name.clone())),
                other => {
                    return Err(AppError::configuration(format!(
                        "unknown model provider '{}' for candidate '{}'",
                        other, candidate.name
                    )))
                }
            };

            if state.models.contains_key(&candidate.name) {
                return Err(AppError::configuration(format!(
                    "duplicate model candidate '{}'",
                    candidate.name
                )));
            }

            tracing::info!(
                model = %candidate.name,
                provider = %candidate.provider,
                timeout_ms = candidate.timeout_ms,
                "Model backend registered"
            );

            state.order.push(candidate.name.clone());
            state.models.insert(
                candidate.name.clone(),
                ResolvedModel {
                    name: candidate.name.clone(),
                    backend,
                    timeout: candidate.timeout(),
                },
            );
        }

        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Register (or replace) a backend under its own name
    pub async fn register(&self, backend: Arc<dyn ModelBackend>, timeout: Duration) {
        let name = backend.name().to_string();
        let mut state = self.state.write().await;
        if !state.models.contains_key(&name) {
            state.order.push(name.clone());
        }
        state.models.insert(name.clone(), ResolvedModel { name, backend, timeout });
    }

    /// Registered names in declaration order
    pub async fn names(&self) -> Vec<String> {
        self.state.read().await.order.clone()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    /// Resolve a preference order into backends.
    ///
    /// An empty order, an unknown name, or a closed registry is a
    /// configuration error.
    pub async fn resolve(&self, order: &[String]) -> Result<Vec<ResolvedModel>> {
        let state = self.state.read().await;

        if state.closed {
            return Err(AppError::configuration("model registry has been shut down"));
        }
        if order.is_empty() {
            return Err(AppError::configuration("model candidate list is empty"));
        }

        order
            .iter()
            .map(|name| {
                state.models.get(name).cloned().ok_or_else(|| {
                    AppError::configuration(format!("unknown model candidate '{}'", name))
                })
            })
            .collect()
    }

    /// Drop every backend (and its HTTP connection pool)
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        let released = state.models.len();
        state.models.clear();
        state.order.clear();
        state.closed = true;
        tracing::info!(released = released, "Model registry shut down");
    }
}
