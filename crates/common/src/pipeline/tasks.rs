//! Summaries, document analysis and drafting
//!
//! Each task renders its own prompt and goes through the same model
//! fallback as queries. Every candidate failing yields a degraded record,
//! not an error.

use super::orchestrator::QueryOrchestrator;
use crate::context::{render_analysis_prompt, render_drafting_prompt, render_summary_prompt};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{AnswerStatus, DocumentKind, TaskKind, TaskRecord};
use chrono::Utc;
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Output of a task no model could complete
pub const DEGRADED_TASK_OUTPUT: &str = "I apologize, but Counsel could not reach a language model to complete this request right now. \
Please try again shortly.";

/// Body of law a summary is read against when the caller names none
pub const DEFAULT_SUMMARY_CONTEXT: &str = "kenyan_law";

impl QueryOrchestrator {
    /// Summarise legal text
    #[instrument(skip_all, fields(text_chars = text.len()))]
    pub async fn summarize(&self, text: &str, context: Option<&str>) -> Result<TaskRecord> {
        let start = Instant::now();
        let text = self.check_document(text, "text")?;
        let context = context
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_SUMMARY_CONTEXT);

        let prompt = render_summary_prompt(text, context);
        self.run_task(TaskKind::Summary, &prompt, start).await
    }

    /// Analyse a legal document: type, concepts, areas of law, issues, keywords
    #[instrument(skip_all, fields(content_chars = content.len()))]
    pub async fn analyze_document(&self, content: &str) -> Result<TaskRecord> {
        let start = Instant::now();
        let content = self.check_document(content, "content")?;

        let prompt = render_analysis_prompt(content);
        self.run_task(TaskKind::Analysis, &prompt, start).await
    }

    /// Draft a legal document of `document_type` from caller parameters
    #[instrument(skip_all, fields(document_type = %document_type))]
    pub async fn draft_document(&self, document_type: &str, parameters: &Map<String, Value>) -> Result<TaskRecord> {
        let start = Instant::now();
        let kind: DocumentKind = document_type.parse()?;

        let prompt = render_drafting_prompt(kind, parameters)?;
        let limit = self.config().max_document_chars;
        let size = prompt.chars().count();
        if size > limit {
            return Err(AppError::PayloadTooLarge { size, limit });
        }

        self.run_task(TaskKind::Drafting, &prompt, start).await
    }

    /// Trimmed, non-empty text within the configured size limit
    fn check_document<'a>(&self, text: &'a str, field: &str) -> Result<&'a str> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::InvalidInput {
                message: format!("{} must not be empty", field),
                field: Some(field.to_string()),
            });
        }

        let limit = self.config().max_document_chars;
        let size = text.chars().count();
        if size > limit {
            return Err(AppError::PayloadTooLarge { size, limit });
        }
        Ok(text)
    }

    async fn run_task(&self, task: TaskKind, prompt: &str, start: Instant) -> Result<TaskRecord> {
        let task_id = Uuid::new_v4();
        let response = self.route(prompt).await?;

        let record = if response.success {
            TaskRecord {
                task_id,
                task,
                output: response.text,
                model_used: response.model,
                success: true,
                status: AnswerStatus::Completed,
                completed_at: Utc::now(),
                processing_time_ms: start.elapsed().as_millis() as u64,
            }
        } else {
            TaskRecord {
                task_id,
                task,
                output: DEGRADED_TASK_OUTPUT.to_string(),
                model_used: None,
                success: false,
                status: AnswerStatus::Degraded,
                completed_at: Utc::now(),
                processing_time_ms: start.elapsed().as_millis() as u64,
            }
        };

        let status = if record.success { "completed" } else { "degraded" };
        metrics::record_task(task.as_str(), start.elapsed().as_secs_f64(), status);
        tracing::info!(
            task_id = %task_id,
            task = task.as_str(),
            status = status,
            model_used = record.model_used.as_deref().unwrap_or("none"),
            processing_time_ms = record.processing_time_ms,
            "Task completed"
        );

        Ok(record)
    }
}
