//! Query pipeline
//!
//! Validate → retrieve → assemble → invoke, producing an `AnswerRecord`
//! for every well-formed query, degraded or not. Summaries, document
//! analysis and drafting share the same model routing.

mod orchestrator;
mod state;
mod tasks;
mod validation;

pub use orchestrator::{confidence_score, OrchestratorConfig, QueryOptions, QueryOrchestrator, DEGRADED_ANSWER};
pub use state::QueryState;
pub use tasks::{DEFAULT_SUMMARY_CONTEXT, DEGRADED_TASK_OUTPUT};
pub use validation::QueryValidator;
