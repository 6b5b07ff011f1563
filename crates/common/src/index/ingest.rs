//! Ingestion boundary: embed (when needed) and upsert fragments

use super::vector::{UpsertOutcome, VectorIndex};
use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::models::{DocumentFragment, EmbeddingVector, FragmentId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A fragment offered for ingestion, optionally with a precomputed vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestItem {
    pub fragment: DocumentFragment,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<EmbeddingVector>,
}

impl IngestItem {
    pub fn new(fragment: DocumentFragment) -> Self {
        Self { fragment, vector: None }
    }

    pub fn with_vector(mut self, vector: EmbeddingVector) -> Self {
        self.vector = Some(vector);
        self
    }
}

/// A fragment the index refused
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedFragment {
    pub fragment_id: FragmentId,
    pub reason: String,
}

/// Per-batch ingestion summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub inserted: usize,
    pub replaced: usize,
    /// Items whose vector was (re)computed here
    pub embedded: usize,
    pub rejected: Vec<RejectedFragment>,
}

/// Embeds fragments with the index's model and upserts them
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Ingest a batch. Items without a vector, or with a vector from another
    /// model, are embedded in one batch call. Per-item index rejections are
    /// reported, not propagated; an embedding failure fails the whole batch.
    pub async fn ingest(&self, items: Vec<IngestItem>) -> Result<IngestReport> {
        let model = self.index.model().to_string();

        let stale: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.vector.as_ref().map_or(true, |v| v.model != model))
            .map(|(i, _)| i)
            .collect();

        let texts: Vec<String> = stale.iter().map(|&i| items[i].fragment.text.clone()).collect();
        let fresh = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&texts).await?
        };

        let mut items = items;
        for (&i, values) in stale.iter().zip(fresh) {
            items[i].vector = Some(EmbeddingVector::new(values, self.embedder.model_name()));
        }

        let mut report = IngestReport {
            embedded: stale.len(),
            ..IngestReport::default()
        };

        for item in items {
            let id = item.fragment.id.clone();
            let Some(vector) = item.vector else {
                report.rejected.push(RejectedFragment {
                    fragment_id: id,
                    reason: "no vector".to_string(),
                });
                continue;
            };

            match self.index.upsert(item.fragment, vector).await {
                Ok(UpsertOutcome::Inserted) => report.inserted += 1,
                Ok(UpsertOutcome::Replaced) => report.replaced += 1,
                Err(e) => {
                    tracing::warn!(fragment_id = %id, error = %e, "Fragment rejected");
                    report.rejected.push(RejectedFragment {
                        fragment_id: id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            inserted = report.inserted,
            replaced = report.replaced,
            embedded = report.embedded,
            rejected = report.rejected.len(),
            "Ingestion batch complete"
        );

        Ok(report)
    }
}
