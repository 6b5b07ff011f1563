//! Retrieval seam between the query pipeline and the vector index

use super::vector::VectorIndex;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{DocumentFragment, QueryResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Optional restriction applied during a search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Only fragments from this jurisdiction (case-insensitive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
}

impl SearchFilter {
    pub fn jurisdiction(jurisdiction: impl Into<String>) -> Self {
        Self {
            jurisdiction: Some(jurisdiction.into()),
        }
    }

    pub fn matches(&self, fragment: &DocumentFragment) -> bool {
        match &self.jurisdiction {
            Some(j) => fragment.jurisdiction.eq_ignore_ascii_case(j),
            None => true,
        }
    }
}

/// Turns a query text into ranked fragments
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<QueryResult>>;
}

/// Embeds the query with the ingestion-time model, then searches the index
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
}

impl VectorRetriever {
    /// Fails if the embedder and index disagree on model or dimension
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Result<Self> {
        if embedder.model_name() != index.model() {
            return Err(AppError::EmbeddingMismatch {
                expected: index.model().to_string(),
                found: embedder.model_name().to_string(),
            });
        }
        if embedder.dimension() != index.dimension() {
            return Err(AppError::DimensionMismatch {
                expected: index.dimension(),
                found: embedder.dimension(),
            });
        }
        Ok(Self { embedder, index })
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<QueryResult>> {
        let start = Instant::now();

        let vector = self.embedder.embed_tagged(query).await?;
        let results = self.index.search_filtered(&vector, k, filter).await?;

        metrics::record_retrieval(start.elapsed().as_secs_f64(), results.len());
        tracing::debug!(
            k = k,
            hits = results.len(),
            top_score = results.first().map(|r| r.score),
            "Retrieval complete"
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::index::SimilarityMetric;

    #[tokio::test]
    async fn test_retrieves_most_similar_fragment() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new("hashing-v1", 256));
        let index = Arc::new(VectorIndex::new("hashing-v1", 256, SimilarityMetric::Cosine, 4000));

        for (title, text) in [
            ("Companies Act", "registration of a private company with the registrar"),
            ("Employment Act", "termination of employment and notice periods"),
            ("Land Act", "allocation of public land by the commission"),
        ] {
            let fragment = DocumentFragment::new(title, format!("https://kenyalaw.org/{}", title), "kenya", text);
            let vector = embedder.embed_tagged(&fragment.text).await.unwrap();
            index.upsert(fragment, vector).await.unwrap();
        }

        let retriever = VectorRetriever::new(embedder, index).unwrap();
        let results = retriever
            .retrieve("how do I register a private company", 2, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].fragment.source_title, "Companies Act");
    }

    #[test]
    fn test_rejects_mismatched_embedder() {
        let index = Arc::new(VectorIndex::new("hashing-v1", 64, SimilarityMetric::Cosine, 4000));

        let other_model: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new("hashing-v2", 64));
        assert!(matches!(
            VectorRetriever::new(other_model, Arc::clone(&index)),
            Err(AppError::EmbeddingMismatch { .. })
        ));

        let other_dim: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new("hashing-v1", 32));
        assert!(matches!(
            VectorRetriever::new(other_dim, index),
            Err(AppError::DimensionMismatch { expected: 64, found: 32 })
        ));
    }

    #[test]
    fn test_filter_matching() {
        let fragment = DocumentFragment::new("Act", "https://a", "Kenya", "text");
        assert!(SearchFilter::default().matches(&fragment));
        assert!(SearchFilter::jurisdiction("kenya").matches(&fragment));
        assert!(!SearchFilter::jurisdiction("uganda").matches(&fragment));
    }
}
