//! Query handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use super::validation_error;
use crate::AppState;
use counsel_common::{
    errors::{AppError, ErrorDetails, Result},
    models::AnswerRecord,
    pipeline::QueryOptions,
};

/// Hard ceiling on request query length in characters; the pipeline applies the configured limit
const MAX_QUERY_CHARS: u64 = 16_384;

/// Query request
#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(max = MAX_QUERY_CHARS))]
    pub query: String,

    #[serde(default)]
    pub context: QueryOptions,
}

/// Batch query request
#[derive(Debug, Deserialize, Validate)]
pub struct BatchQueryRequest {
    #[validate(length(min = 1))]
    pub queries: Vec<String>,

    #[serde(default)]
    pub context: QueryOptions,
}

/// One batch entry: an answer, or why the query was rejected
#[derive(Serialize)]
#[serde(untagged)]
pub enum BatchQueryItem {
    Answered(Box<AnswerRecord>),
    Rejected { query: String, error: ErrorDetails },
}

/// Batch query response
#[derive(Serialize)]
pub struct BatchQueryResponse {
    pub results: Vec<BatchQueryItem>,
    pub processing_time_ms: u64,
}

/// Answer a single legal query
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<AnswerRecord>> {
    request.validate().map_err(validation_error)?;

    let record = state.orchestrator.answer(&request.query, &request.context).await?;
    Ok(Json(record))
}

/// Answer several queries concurrently
pub async fn batch_query(
    State(state): State<AppState>,
    Json(request): Json<BatchQueryRequest>,
) -> Result<Json<BatchQueryResponse>> {
    let start = Instant::now();

    request.validate().map_err(validation_error)?;

    let max = state.config.server.max_batch_queries;
    if request.queries.len() > max {
        return Err(AppError::InvalidInput {
            message: format!("Maximum {} queries per batch", max),
            field: Some("queries".to_string()),
        });
    }

    let answers = state
        .orchestrator
        .answer_batch(&request.queries, &request.context)
        .await;

    let results = request
        .queries
        .into_iter()
        .zip(answers)
        .map(|(query, answer)| match answer {
            Ok(record) => BatchQueryItem::Answered(Box::new(record)),
            Err(e) => BatchQueryItem::Rejected {
                query,
                error: ErrorDetails {
                    code: e.code(),
                    message: e.to_string(),
                    field: None,
                },
            },
        })
        .collect::<Vec<_>>();

    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        queries = results.len(),
        latency_ms = processing_time_ms,
        "Batch query completed"
    );

    Ok(Json(BatchQueryResponse {
        results,
        processing_time_ms,
    }))
}
