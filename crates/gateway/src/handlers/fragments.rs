//! Fragment ingestion handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validation_error;
use crate::AppState;
use counsel_common::{
    errors::Result,
    index::{IngestItem, IngestReport},
    models::{DocumentFragment, EmbeddingVector},
};

/// Request to upsert fragments into the index
#[derive(Debug, Deserialize, Validate)]
pub struct UpsertFragmentsRequest {
    #[validate(length(min = 1, max = 256), nested)]
    pub fragments: Vec<FragmentInput>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct FragmentInput {
    /// Caller-supplied id; derived from url and text when absent
    #[serde(default)]
    #[validate(length(min = 1, max = 256))]
    pub id: Option<String>,

    #[validate(length(min = 1, max = 1000))]
    pub source_title: String,

    #[validate(url)]
    pub source_url: String,

    #[validate(length(min = 1, max = 64))]
    pub jurisdiction: String,

    #[serde(default)]
    pub document_type: Option<String>,

    #[validate(length(min = 1))]
    pub text: String,

    /// Precomputed embedding; re-embedded when absent or from another model
    #[serde(default)]
    pub vector: Option<EmbeddingVector>,
}

impl FragmentInput {
    fn into_item(self) -> IngestItem {
        let mut fragment = DocumentFragment::new(self.source_title, self.source_url, self.jurisdiction, self.text);
        if let Some(id) = self.id {
            fragment = fragment.with_id(id);
        }
        if let Some(document_type) = self.document_type {
            fragment = fragment.with_document_type(document_type);
        }

        let item = IngestItem::new(fragment);
        match self.vector {
            Some(vector) => item.with_vector(vector),
            None => item,
        }
    }
}

/// Upsert response
#[derive(Serialize)]
pub struct UpsertFragmentsResponse {
    #[serde(flatten)]
    pub report: IngestReport,
    pub index_size: usize,
}

/// Upsert a batch of fragments
pub async fn upsert_fragments(
    State(state): State<AppState>,
    Json(request): Json<UpsertFragmentsRequest>,
) -> Result<Json<UpsertFragmentsResponse>> {
    request.validate().map_err(validation_error)?;

    let items = request
        .fragments
        .into_iter()
        .map(FragmentInput::into_item)
        .collect();

    let report = state.ingestor.ingest(items).await?;

    Ok(Json(UpsertFragmentsResponse {
        report,
        index_size: state.index.len().await,
    }))
}
