//! Query Orchestrator - End-to-end answer generation
//!
//! Provides:
//! - Input validation before any retrieval
//! - Retrieval with failures absorbed as "no context"
//! - Budgeted context assembly and prompt rendering
//! - Model fallback under an overall deadline
//! - Citation selection and confidence scoring

use super::state::{QueryState, StateTracker};
use super::validation::QueryValidator;
use crate::config::AppConfig;
use crate::context::{render_prompt, ContextAssembler, PromptContext};
use crate::errors::{AppError, Result};
use crate::index::{Retriever, SearchFilter};
use crate::llm::{ModelResponse, ModelRouter};
use crate::metrics;
use crate::models::{AnswerRecord, AnswerStatus, SourceCitation};
use chrono::Utc;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;
use uuid::Uuid;

/// Answer text returned when no model could be reached
pub const DEGRADED_ANSWER: &str = "I apologize, but Counsel could not reach a language model to answer your query right now. \
The sources listed below were found relevant to your question; please try again shortly.";

/// Largest per-request `top_k` override honoured
const MAX_TOP_K: usize = 50;

/// Confidence for a successful answer: `base + (1 - base) * top_score`.
///
/// Non-decreasing in `top_score`; equals `base` when no context was used.
pub fn confidence_score(base: f32, top_score: f32) -> f32 {
    let top = top_score.clamp(0.0, 1.0);
    (base + (1.0 - base) * top).clamp(0.0, 1.0)
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub top_k: usize,

    /// Model preference order
    pub preference: Vec<String>,

    pub confidence_base: f32,

    pub max_query_chars: usize,

    /// Largest text accepted by summaries, analyses and drafting
    pub max_document_chars: usize,

    /// Overall routing deadline; `None` derives it from the candidate timeouts
    pub deadline: Option<Duration>,
}

impl From<&AppConfig> for OrchestratorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            preference: config.models.preference_order(),
            confidence_base: config.query.confidence_base,
            max_query_chars: config.query.max_query_chars,
            max_document_chars: config.query.max_document_chars,
            deadline: config.query.deadline_ms.map(Duration::from_millis),
        }
    }
}

/// Optional per-request context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Restrict retrieval to one jurisdiction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,

    /// Override the configured number of fragments retrieved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

/// Runs the query pipeline
pub struct QueryOrchestrator {
    retriever: Arc<dyn Retriever>,
    assembler: ContextAssembler,
    router: Arc<ModelRouter>,
    validator: QueryValidator,
    citation_marker: Regex,
    config: OrchestratorConfig,
}

impl QueryOrchestrator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        assembler: ContextAssembler,
        router: Arc<ModelRouter>,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        let citation_marker = Regex::new(r"\[(\d{1,3})\]").map_err(|e| AppError::Internal {
            message: format!("invalid citation pattern: {}", e),
        })?;

        Ok(Self {
            retriever,
            assembler,
            router,
            validator: QueryValidator::new(config.max_query_chars)?,
            citation_marker,
            config,
        })
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Answer one query.
    ///
    /// Only malformed input (and misconfigured model routing) is an error;
    /// a query every model failed on still yields a degraded record.
    #[instrument(skip_all, fields(query_chars = query.len()))]
    pub async fn answer(&self, query: &str, options: &QueryOptions) -> Result<AnswerRecord> {
        let start = Instant::now();
        let query = self.validator.validate(query)?;

        let query_id = Uuid::new_v4();
        let mut state = StateTracker::new(query_id);

        state.advance(QueryState::Retrieving)?;
        let k = options.top_k.unwrap_or(self.config.top_k).min(MAX_TOP_K);
        let filter = options
            .jurisdiction
            .as_ref()
            .map(|j| SearchFilter::jurisdiction(j.clone()));
        let results = match self.retriever.retrieve(query, k, filter.as_ref()).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(query_id = %query_id, error = %e, "Retrieval failed, continuing without context");
                Vec::new()
            }
        };

        state.advance(QueryState::Assembling)?;
        let context = self.assembler.assemble(&results);
        tracing::debug!(
            query_id = %query_id,
            retrieved = results.len(),
            included = context.len(),
            budget_used = context.used(),
            "Context assembled"
        );

        state.advance(QueryState::Invoking)?;
        let prompt = render_prompt(query, &context);
        let response = self.route(&prompt).await?;

        let record = if response.success {
            state.advance(QueryState::Completed)?;
            AnswerRecord {
                query_id,
                query: query.to_string(),
                sources: self.cite(&response.text, &context),
                confidence: confidence_score(self.config.confidence_base, context.top_score()),
                answer: response.text,
                model_used: response.model,
                success: true,
                status: AnswerStatus::Completed,
                answered_at: Utc::now(),
                processing_time_ms: start.elapsed().as_millis() as u64,
            }
        } else {
            state.advance(QueryState::Degraded)?;
            metrics::record_degraded();
            AnswerRecord {
                query_id,
                query: query.to_string(),
                answer: DEGRADED_ANSWER.to_string(),
                sources: context.sources(),
                confidence: 0.0,
                model_used: None,
                success: false,
                status: AnswerStatus::Degraded,
                answered_at: Utc::now(),
                processing_time_ms: start.elapsed().as_millis() as u64,
            }
        };

        let status = if record.success { "completed" } else { "degraded" };
        metrics::record_query(start.elapsed().as_secs_f64(), status);
        tracing::info!(
            query_id = %query_id,
            status = status,
            model_used = record.model_used.as_deref().unwrap_or("none"),
            sources = record.sources.len(),
            confidence = record.confidence,
            processing_time_ms = record.processing_time_ms,
            "Query answered"
        );

        Ok(record)
    }

    /// Answer several queries concurrently, results in input order
    pub async fn answer_batch(&self, queries: &[String], options: &QueryOptions) -> Vec<Result<AnswerRecord>> {
        futures::future::join_all(queries.iter().map(|q| self.answer(q, options))).await
    }

    /// Send a prompt through the preference order under the overall deadline
    pub(super) async fn route(&self, prompt: &str) -> Result<ModelResponse> {
        self.router
            .invoke_within(prompt, &self.config.preference, self.config.deadline)
            .await
    }

    /// Sources referenced by `[n]` markers in the answer, or every included
    /// fragment when the answer has no valid markers. Never outside `context`.
    fn cite(&self, answer: &str, context: &PromptContext) -> Vec<SourceCitation> {
        let mut markers: Vec<usize> = self
            .citation_marker
            .captures_iter(answer)
            .filter_map(|cap| cap.get(1)?.as_str().parse().ok())
            .filter(|n| (1..=context.len()).contains(n))
            .collect();
        markers.sort_unstable();
        markers.dedup();

        if markers.is_empty() {
            return context.sources();
        }

        markers
            .into_iter()
            .filter_map(|n| context.by_marker(n))
            .map(|entry| SourceCitation::from_fragment(&entry.fragment, entry.score))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AssemblerConfig, BudgetUnit};
    use crate::llm::{MockBackend, MockReply, ModelBackend, ModelFailure, ModelRegistry};
    use crate::models::{DocumentFragment, QueryResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns fixed hits and counts calls
    struct FixedRetriever {
        results: Vec<QueryResult>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FixedRetriever {
        fn new(results: Vec<QueryResult>) -> Self {
            Self {
                results,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, _query: &str, k: usize, _filter: Option<&SearchFilter>) -> Result<Vec<QueryResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::EmbeddingError {
                    message: "embedding service down".to_string(),
                });
            }
            Ok(self.results.iter().take(k).cloned().collect())
        }
    }

    fn hit(title: &str, chars: usize, score: f32) -> QueryResult {
        QueryResult {
            fragment: Arc::new(DocumentFragment::new(
                title,
                format!("https://kenyalaw.org/{}", title.replace(' ', "-")),
                "kenya",
                "r".repeat(chars),
            )),
            score,
        }
    }

    /// The Companies Act hit (0.91), an adjacent section (0.4) and an unrelated one (0.1)
    fn kenya_results() -> Vec<QueryResult> {
        vec![
            hit("Companies Act, 2015", 300, 0.91),
            hit("Companies Act, 2015 s.13", 300, 0.4),
            hit("Traffic Act", 300, 0.1),
        ]
    }

    fn orchestrator_config(preference: Vec<String>, deadline: Option<Duration>) -> OrchestratorConfig {
        OrchestratorConfig {
            top_k: 8,
            preference,
            confidence_base: 0.2,
            max_query_chars: 2000,
            max_document_chars: 5000,
            deadline,
        }
    }

    /// Orchestrator over `backends`, each registered with its own per-attempt timeout
    async fn orchestrator_with(
        retriever: Arc<dyn Retriever>,
        backends: Vec<(Arc<dyn ModelBackend>, Duration)>,
        assembler: AssemblerConfig,
        deadline: Option<Duration>,
    ) -> QueryOrchestrator {
        let registry = Arc::new(ModelRegistry::new());
        let mut preference = Vec::new();
        for (backend, timeout) in backends {
            preference.push(backend.name().to_string());
            registry.register(backend, timeout).await;
        }

        QueryOrchestrator::new(
            retriever,
            ContextAssembler::new(assembler),
            Arc::new(ModelRouter::new(registry, 1)),
            orchestrator_config(preference, deadline),
        )
        .unwrap()
    }

    fn characters(floor: f32, budget: usize) -> AssemblerConfig {
        AssemblerConfig {
            similarity_floor: floor,
            budget,
            unit: BudgetUnit::Characters,
            max_fragments: None,
        }
    }

    async fn orchestrator(
        retriever: Arc<dyn Retriever>,
        backends: Vec<Arc<dyn ModelBackend>>,
        floor: f32,
        budget: usize,
    ) -> QueryOrchestrator {
        let backends = backends
            .into_iter()
            .map(|backend| (backend, Duration::from_millis(200)))
            .collect();
        orchestrator_with(retriever, backends, characters(floor, budget), None).await
    }

    #[tokio::test]
    async fn test_kenya_company_registration() {
        let query = "What are the requirements for registering a company in Kenya?";
        let results = kenya_results();

        // Floor 0.5 drops 0.4 and 0.1; a 400-character budget holds one 300-character fragment
        let context = ContextAssembler::new(characters(0.5, 400)).build(&results, 400);
        assert_eq!(context.len(), 1);
        assert!((context.entries()[0].score - 0.91).abs() < 1e-6);

        // No markers in the reply, so every included fragment is cited
        let model = Arc::new(MockBackend::new("claude").with_reply(MockReply::Fixed(
            "Lodge an application for registration with the Registrar of Companies.".to_string(),
        )));
        let orchestrator = orchestrator(
            Arc::new(FixedRetriever::new(results)),
            vec![model.clone() as Arc<dyn ModelBackend>],
            0.5,
            400,
        )
        .await;

        let record = orchestrator.answer(query, &QueryOptions::default()).await.unwrap();

        let prompt = model.last_prompt().unwrap();
        assert!(prompt.contains(query));
        assert!(prompt.contains("\n[1] Companies Act, 2015 (kenya)"));
        assert!(!prompt.contains("[2]"));
        assert!(!prompt.contains("Traffic Act"));

        assert!(record.success);
        assert_eq!(record.status, AnswerStatus::Completed);
        assert_eq!(record.model_used.as_deref(), Some("claude"));
        assert_eq!(record.sources.len(), 1);
        assert_eq!(record.sources[0].title, "Companies Act, 2015");
        assert!((record.sources[0].score - 0.91).abs() < 1e-6);
        assert!((record.confidence - confidence_score(0.2, 0.91)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_fallback_after_primary_timeouts_is_served() {
        for _ in 0..5 {
            // A never answers in time; B misses its first attempt and then
            // answers just inside its timeout, after three timeouts have elapsed
            let primary = MockBackend::new("A").with_delay(Duration::from_secs(10));
            let fallback = MockBackend::new("B")
                .with_delay_schedule(vec![Duration::from_secs(10), Duration::from_millis(40)])
                .with_reply(MockReply::Fixed("Served by the fallback.".to_string()));

            let orchestrator = orchestrator_with(
                Arc::new(FixedRetriever::new(kenya_results())),
                vec![
                    (Arc::new(primary) as Arc<dyn ModelBackend>, Duration::from_millis(50)),
                    (Arc::new(fallback) as Arc<dyn ModelBackend>, Duration::from_millis(50)),
                ],
                characters(0.5, 400),
                None,
            )
            .await;

            let record = orchestrator.answer("company registration", &QueryOptions::default()).await.unwrap();
            assert_eq!(record.status, AnswerStatus::Completed);
            assert_eq!(record.model_used.as_deref(), Some("B"));
            assert!(record.confidence > 0.0);
        }
    }

    #[tokio::test]
    async fn test_exhausted_deadline_degrades() {
        let slow = Arc::new(MockBackend::new("A").with_delay(Duration::from_secs(5)));
        let fast = Arc::new(MockBackend::new("B"));
        let orchestrator = orchestrator_with(
            Arc::new(FixedRetriever::new(kenya_results())),
            vec![
                (slow.clone() as Arc<dyn ModelBackend>, Duration::from_millis(500)),
                (fast.clone() as Arc<dyn ModelBackend>, Duration::from_millis(500)),
            ],
            characters(0.5, 400),
            Some(Duration::from_millis(60)),
        )
        .await;

        let record = orchestrator.answer("company registration", &QueryOptions::default()).await.unwrap();

        assert!(record.is_degraded());
        assert_eq!(record.confidence, 0.0);
        assert!(record.model_used.is_none());
        assert_eq!(record.answer, DEGRADED_ANSWER);
        assert_eq!(record.sources.len(), 1);
        assert_eq!(slow.calls(), 1);
        assert_eq!(fast.calls(), 0);
        assert!(record.processing_time_ms < 500);
    }

    #[tokio::test]
    async fn test_empty_query_rejected_before_retrieval() {
        let retriever = Arc::new(FixedRetriever::new(kenya_results()));
        let orchestrator = orchestrator(
            retriever.clone(),
            vec![Arc::new(MockBackend::new("claude")) as Arc<dyn ModelBackend>],
            0.0,
            1000,
        )
        .await;

        for query in ["", "   \n"] {
            let err = orchestrator.answer(query, &QueryOptions::default()).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidInput { .. }));
        }
        let too_long = "a".repeat(2001);
        assert!(orchestrator.answer(&too_long, &QueryOptions::default()).await.is_err());

        assert_eq!(retriever.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_models_fail_yields_degraded_record() {
        let retriever = Arc::new(FixedRetriever::new(kenya_results()));
        let orchestrator = orchestrator(
            retriever,
            vec![
                Arc::new(MockBackend::new("claude").with_reply(MockReply::Fail(ModelFailure::RateLimited)))
                    as Arc<dyn ModelBackend>,
                Arc::new(MockBackend::new("local").with_delay(Duration::from_secs(5))) as Arc<dyn ModelBackend>,
            ],
            0.0,
            1000,
        )
        .await;

        let record = orchestrator
            .answer("What is the notice period for termination?", &QueryOptions::default())
            .await
            .unwrap();

        assert!(!record.success);
        assert!(record.is_degraded());
        assert_eq!(record.confidence, 0.0);
        assert!(record.model_used.is_none());
        assert_eq!(record.answer, DEGRADED_ANSWER);
        // Degraded answers still point at the context that was assembled
        assert_eq!(record.sources.len(), 3);
    }

    #[tokio::test]
    async fn test_retrieval_failure_still_answers() {
        let orchestrator = orchestrator(
            Arc::new(FixedRetriever::failing()),
            vec![Arc::new(MockBackend::new("claude")) as Arc<dyn ModelBackend>],
            0.0,
            1000,
        )
        .await;

        let record = orchestrator
            .answer("Define adverse possession", &QueryOptions::default())
            .await
            .unwrap();

        assert!(record.success);
        assert!(record.sources.is_empty());
        assert!((record.confidence - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_citations_never_outside_context() {
        let answer = "See [2] and [1], also [2] again; [9] and [0] do not exist.";
        let orchestrator = orchestrator(
            Arc::new(FixedRetriever::new(kenya_results())),
            vec![Arc::new(MockBackend::new("claude").with_reply(MockReply::Fixed(answer.to_string())))
                as Arc<dyn ModelBackend>],
            0.3,
            1000,
        )
        .await;

        let record = orchestrator
            .answer("company registration", &QueryOptions::default())
            .await
            .unwrap();

        let titles: Vec<&str> = record.sources.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Companies Act, 2015", "Companies Act, 2015 s.13"]);
    }

    #[tokio::test]
    async fn test_unmarked_answer_cites_whole_context() {
        let orchestrator = orchestrator(
            Arc::new(FixedRetriever::new(kenya_results())),
            vec![Arc::new(MockBackend::new("claude").with_reply(MockReply::Fixed("No markers here.".to_string())))
                as Arc<dyn ModelBackend>],
            0.3,
            1000,
        )
        .await;

        let record = orchestrator.answer("company registration", &QueryOptions::default()).await.unwrap();
        assert_eq!(record.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_confidence_monotone_in_top_similarity() {
        let mut previous = -1.0;
        for top in [0.0f32, 0.3, 0.55, 0.8, 0.91, 1.0] {
            let orchestrator = orchestrator(
                Arc::new(FixedRetriever::new(vec![hit("Act", 100, top)])),
                vec![Arc::new(MockBackend::new("claude")) as Arc<dyn ModelBackend>],
                0.0,
                1000,
            )
            .await;

            let record = orchestrator.answer("question", &QueryOptions::default()).await.unwrap();
            assert!(record.confidence >= previous);
            assert!((0.0..=1.0).contains(&record.confidence));
            previous = record.confidence;
        }
        assert!((previous - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_top_k_override_and_batch() {
        let retriever = Arc::new(FixedRetriever::new(kenya_results()));
        let orchestrator = orchestrator(
            retriever.clone(),
            vec![Arc::new(MockBackend::new("claude").with_reply(MockReply::Fixed("Plain.".to_string())))
                as Arc<dyn ModelBackend>],
            0.0,
            1000,
        )
        .await;

        let options = QueryOptions {
            top_k: Some(1),
            ..QueryOptions::default()
        };
        let queries = vec!["first question".to_string(), String::new(), "third question".to_string()];
        let records = orchestrator.answer_batch(&queries, &options).await;

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].as_ref().unwrap().sources.len(), 1);
        assert!(matches!(records[1], Err(AppError::InvalidInput { .. })));
        assert_eq!(records[2].as_ref().unwrap().query, "third question");
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_confidence_formula() {
        assert_eq!(confidence_score(0.2, 0.0), 0.2);
        assert!((confidence_score(0.2, 0.5) - 0.6).abs() < 1e-6);
        assert_eq!(confidence_score(0.2, 1.0), 1.0);
        assert_eq!(confidence_score(0.2, 7.0), 1.0);
    }
}
