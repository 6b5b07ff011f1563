//! Summary, analysis and drafting handlers

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{Map, Value};
use validator::Validate;

use super::validation_error;
use crate::AppState;
use counsel_common::{errors::Result, models::TaskRecord};

/// Summary request
#[derive(Debug, Deserialize, Validate)]
pub struct SummaryRequest {
    #[validate(length(min = 1))]
    pub text: String,

    /// Body of law to read the text against, e.g. "kenyan_law"
    #[serde(default)]
    #[validate(length(max = 128))]
    pub context: Option<String>,
}

/// Document analysis request
#[derive(Debug, Deserialize, Validate)]
pub struct AnalysisRequest {
    #[validate(length(min = 1))]
    pub content: String,
}

/// Drafting request
#[derive(Debug, Deserialize, Validate)]
pub struct DraftRequest {
    #[validate(length(min = 1, max = 64))]
    pub document_type: String,

    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Summarise legal text
pub async fn summarize(
    State(state): State<AppState>,
    Json(request): Json<SummaryRequest>,
) -> Result<Json<TaskRecord>> {
    request.validate().map_err(validation_error)?;

    let record = state
        .orchestrator
        .summarize(&request.text, request.context.as_deref())
        .await?;
    Ok(Json(record))
}

/// Analyse a legal document
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<TaskRecord>> {
    request.validate().map_err(validation_error)?;

    let record = state.orchestrator.analyze_document(&request.content).await?;
    Ok(Json(record))
}

/// Draft a legal document
pub async fn draft(
    State(state): State<AppState>,
    Json(request): Json<DraftRequest>,
) -> Result<Json<TaskRecord>> {
    request.validate().map_err(validation_error)?;

    let record = state
        .orchestrator
        .draft_document(&request.document_type, &request.parameters)
        .await?;
    Ok(Json(record))
}
