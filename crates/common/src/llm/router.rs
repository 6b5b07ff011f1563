//! Ordered fallback routing across model backends

use super::registry::{ModelRegistry, ResolvedModel};
use super::ModelFailure;
use crate::errors::Result;
use crate::metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Text of the response returned when every candidate failed
pub const UNAVAILABLE_TEXT: &str = "unavailable";

/// One attempt against one backend
#[derive(Debug, Clone)]
pub struct ModelAttempt {
    pub model: String,
    pub latency: Duration,
    /// `None` on success
    pub failure: Option<ModelFailure>,
}

/// Outcome of routing a prompt through the preference order
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub text: String,

    /// Model that produced `text`; `None` when unsuccessful
    pub model: Option<String>,

    /// Wall time across all attempts
    pub latency: Duration,

    pub success: bool,

    /// Routing stopped because the overall deadline ran out
    pub deadline_exceeded: bool,

    pub attempts: Vec<ModelAttempt>,
}

impl ModelResponse {
    fn unavailable(attempts: Vec<ModelAttempt>, latency: Duration, deadline_exceeded: bool) -> Self {
        Self {
            text: UNAVAILABLE_TEXT.to_string(),
            model: None,
            latency,
            success: false,
            deadline_exceeded,
            attempts,
        }
    }
}

/// How one candidate ended
enum CandidateOutcome {
    Served(String),
    Failed,
    OutOfTime,
}

/// Scheduling allowance granted to every attempt on top of its timeout
const ATTEMPT_ALLOWANCE: Duration = Duration::from_millis(25);

/// Routes prompts through an ordered list of candidate models
pub struct ModelRouter {
    registry: Arc<ModelRegistry>,
    timeout_retries: u32,
}

impl ModelRouter {
    /// `timeout_retries` is the number of same-model retries granted after a timeout
    pub fn new(registry: Arc<ModelRegistry>, timeout_retries: u32) -> Self {
        Self {
            registry,
            timeout_retries,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Upper bound on one `invoke` over `order`: every candidate timing out
    /// on every allowed attempt, plus a small scheduling allowance per attempt.
    pub async fn overall_deadline(&self, order: &[String]) -> Result<Duration> {
        let candidates = self.registry.resolve(order).await?;
        Ok(self.deadline_for(&candidates))
    }

    fn deadline_for(&self, candidates: &[ResolvedModel]) -> Duration {
        candidates
            .iter()
            .map(|c| (c.timeout + ATTEMPT_ALLOWANCE) * (1 + self.timeout_retries))
            .sum()
    }

    /// Try each candidate in order until one answers, within `overall_deadline`.
    ///
    /// Only a configuration problem is an error; exhausting the candidates
    /// yields an unsuccessful response.
    pub async fn invoke(&self, prompt: &str, order: &[String]) -> Result<ModelResponse> {
        self.invoke_within(prompt, order, None).await
    }

    /// `invoke` with an explicit overall deadline (`None` derives it from the
    /// candidates). No attempt starts once the deadline has passed and every
    /// attempt's timeout is cut to the time remaining.
    pub async fn invoke_within(
        &self,
        prompt: &str,
        order: &[String],
        deadline: Option<Duration>,
    ) -> Result<ModelResponse> {
        let candidates = self.registry.resolve(order).await?;
        let deadline = deadline.unwrap_or_else(|| self.deadline_for(&candidates));
        let start = Instant::now();
        let cutoff = start.checked_add(deadline);
        let mut attempts = Vec::new();

        for candidate in &candidates {
            match self.try_candidate(candidate, prompt, cutoff, &mut attempts).await {
                CandidateOutcome::Served(text) => {
                    tracing::info!(
                        served_model = %candidate.name,
                        attempts = attempts.len(),
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Model response served"
                    );
                    metrics::record_served_model(&candidate.name);

                    return Ok(ModelResponse {
                        text,
                        model: Some(candidate.name.clone()),
                        latency: start.elapsed(),
                        success: true,
                        deadline_exceeded: false,
                        attempts,
                    });
                }
                CandidateOutcome::Failed => {}
                CandidateOutcome::OutOfTime => {
                    tracing::warn!(
                        deadline_ms = deadline.as_millis() as u64,
                        attempts = attempts.len(),
                        "Model routing exceeded overall deadline"
                    );
                    return Ok(ModelResponse::unavailable(attempts, start.elapsed(), true));
                }
            }
        }

        tracing::warn!(
            candidates = candidates.len(),
            attempts = attempts.len(),
            "All model candidates failed"
        );
        Ok(ModelResponse::unavailable(attempts, start.elapsed(), false))
    }

    /// Attempt one candidate, retrying on timeout while budget and time remain
    async fn try_candidate(
        &self,
        candidate: &ResolvedModel,
        prompt: &str,
        cutoff: Option<Instant>,
        attempts: &mut Vec<ModelAttempt>,
    ) -> CandidateOutcome {
        let mut retries_left = self.timeout_retries;

        loop {
            let limit = match cutoff {
                Some(cutoff) => {
                    let remaining = cutoff.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return CandidateOutcome::OutOfTime;
                    }
                    candidate.timeout.min(remaining)
                }
                None => candidate.timeout,
            };

            let attempt_start = Instant::now();
            let outcome = match tokio::time::timeout(limit, candidate.backend.invoke(prompt, limit)).await {
                Ok(Ok(text)) if text.trim().is_empty() => {
                    Err(ModelFailure::Malformed("blank response".to_string()))
                }
                Ok(result) => result,
                Err(_) => Err(ModelFailure::Timeout(limit)),
            };
            let latency = attempt_start.elapsed();

            match outcome {
                Ok(text) => {
                    metrics::record_model_attempt(&candidate.name, "success", latency.as_secs_f64());
                    attempts.push(ModelAttempt {
                        model: candidate.name.clone(),
                        latency,
                        failure: None,
                    });
                    return CandidateOutcome::Served(text);
                }
                Err(failure) => {
                    metrics::record_model_attempt(&candidate.name, failure.label(), latency.as_secs_f64());
                    let timed_out = matches!(failure, ModelFailure::Timeout(_));
                    // A timeout on a shortened attempt means the deadline ran out
                    let cut_short = timed_out && limit < candidate.timeout;
                    let retry = timed_out && !cut_short && retries_left > 0;

                    tracing::warn!(
                        model = %candidate.name,
                        error = %failure,
                        retry = retry,
                        "Model attempt failed"
                    );
                    attempts.push(ModelAttempt {
                        model: candidate.name.clone(),
                        latency,
                        failure: Some(failure),
                    });

                    if cut_short {
                        return CandidateOutcome::OutOfTime;
                    }
                    if !retry {
                        return CandidateOutcome::Failed;
                    }
                    retries_left -= 1;
                }
            }
        }
    }
}
