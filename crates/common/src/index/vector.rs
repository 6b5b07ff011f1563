//! In-memory vector index
//!
//! Vectors are prepared once at upsert time (normalised for cosine) and
//! scanned linearly at query time with a k-bounded heap, so a search costs
//! O(n log k). Structural mutation is serialised behind a `RwLock`; stored
//! fragments are shared as `Arc` and never mutated in place.

use super::retriever::SearchFilter;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{DocumentFragment, EmbeddingVector, FragmentId, QueryResult};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Similarity metric used to score stored vectors against a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Cosine similarity, negatives clamped to 0
    Cosine,
    /// Raw dot product clamped to [0, 1]
    Dot,
    /// 1 / (1 + euclidean distance)
    Euclidean,
}

impl SimilarityMetric {
    fn prepare(self, values: &[f32]) -> Vec<f32> {
        match self {
            SimilarityMetric::Cosine => {
                let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
                if norm > 0.0 {
                    values.iter().map(|v| v / norm).collect()
                } else {
                    values.to_vec()
                }
            }
            SimilarityMetric::Dot | SimilarityMetric::Euclidean => values.to_vec(),
        }
    }

    /// Always within [0, 1]; overflow to a non-finite value scores 0
    fn score(self, query: &[f32], stored: &[f32]) -> f32 {
        let score = match self {
            SimilarityMetric::Cosine | SimilarityMetric::Dot => {
                let dot: f32 = query.iter().zip(stored).map(|(a, b)| a * b).sum();
                dot.clamp(0.0, 1.0)
            }
            SimilarityMetric::Euclidean => {
                let dist = query
                    .iter()
                    .zip(stored)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>()
                    .sqrt();
                1.0 / (1.0 + dist)
            }
        };

        if score.is_finite() {
            score
        } else {
            0.0
        }
    }
}

/// Whether an upsert added a fragment or swapped an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

struct IndexEntry {
    fragment: Arc<DocumentFragment>,
    vector: Vec<f32>,
}

#[derive(Default)]
struct IndexState {
    entries: Vec<IndexEntry>,
    positions: HashMap<FragmentId, usize>,
}

/// Heap candidate; "greater" means a better hit (higher score, then earlier insertion)
#[derive(Debug, Clone, Copy)]
struct Ranked {
    score: f32,
    position: usize,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.position.cmp(&self.position))
    }
}

/// Vector index bound to one embedding model and dimension
pub struct VectorIndex {
    model: String,
    dimension: usize,
    metric: SimilarityMetric,
    max_fragment_chars: usize,
    state: RwLock<IndexState>,
    searches: AtomicU64,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension` produced by `model`
    pub fn new(
        model: impl Into<String>,
        dimension: usize,
        metric: SimilarityMetric,
        max_fragment_chars: usize,
    ) -> Self {
        Self {
            model: model.into(),
            dimension,
            metric,
            max_fragment_chars,
            state: RwLock::new(IndexState::default()),
            searches: AtomicU64::new(0),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    /// Number of stored fragments
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of searches served since creation
    pub fn search_count(&self) -> u64 {
        self.searches.load(AtomicOrdering::Relaxed)
    }

    /// Fetch a stored fragment by id
    pub async fn get(&self, id: &FragmentId) -> Option<Arc<DocumentFragment>> {
        let state = self.state.read().await;
        state
            .positions
            .get(id)
            .map(|&pos| Arc::clone(&state.entries[pos].fragment))
    }

    fn check_vector(&self, vector: &EmbeddingVector) -> Result<()> {
        if vector.model != self.model {
            return Err(AppError::EmbeddingMismatch {
                expected: self.model.clone(),
                found: vector.model.clone(),
            });
        }
        if vector.dimension() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                found: vector.dimension(),
            });
        }
        if vector.values.iter().any(|v| !v.is_finite()) {
            return Err(AppError::invalid_input("vector contains non-finite values"));
        }
        Ok(())
    }

    /// Insert a fragment, or atomically replace the fragment stored under the same id.
    ///
    /// A replaced fragment keeps its original insertion rank for tie-breaking.
    pub async fn upsert(&self, fragment: DocumentFragment, vector: EmbeddingVector) -> Result<UpsertOutcome> {
        self.check_vector(&vector)?;

        if fragment.text.trim().is_empty() {
            return Err(AppError::InvalidInput {
                message: format!("fragment {} has no text", fragment.id),
                field: Some("text".to_string()),
            });
        }
        let chars = fragment.char_len();
        if chars > self.max_fragment_chars {
            return Err(AppError::InvalidInput {
                message: format!(
                    "fragment {} is {} characters, limit is {}",
                    fragment.id, chars, self.max_fragment_chars
                ),
                field: Some("text".to_string()),
            });
        }

        let entry = IndexEntry {
            vector: self.metric.prepare(&vector.values),
            fragment: Arc::new(fragment),
        };
        let id = entry.fragment.id.clone();

        let mut state = self.state.write().await;
        let outcome = match state.positions.get(&id).copied() {
            Some(pos) => {
                state.entries[pos] = entry;
                UpsertOutcome::Replaced
            }
            None => {
                let pos = state.entries.len();
                state.entries.push(entry);
                state.positions.insert(id.clone(), pos);
                UpsertOutcome::Inserted
            }
        };
        let size = state.entries.len();
        drop(state);

        metrics::set_index_size(size);
        tracing::debug!(fragment_id = %id, outcome = ?outcome, index_size = size, "Fragment upserted");

        Ok(outcome)
    }

    /// Up to `k` nearest fragments in non-increasing similarity, ties in insertion order
    pub async fn search(&self, query: &EmbeddingVector, k: usize) -> Result<Vec<QueryResult>> {
        self.search_filtered(query, k, None).await
    }

    /// `search` restricted to fragments matching `filter`
    pub async fn search_filtered(
        &self,
        query: &EmbeddingVector,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<QueryResult>> {
        self.searches.fetch_add(1, AtomicOrdering::Relaxed);
        self.check_vector(query)?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let query = self.metric.prepare(&query.values);
        let state = self.state.read().await;

        let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(k + 1);
        for (position, entry) in state.entries.iter().enumerate() {
            if let Some(filter) = filter {
                if !filter.matches(&entry.fragment) {
                    continue;
                }
            }

            let candidate = Ranked {
                score: self.metric.score(&query, &entry.vector),
                position,
            };

            if heap.len() < k {
                heap.push(Reverse(candidate));
            } else if heap.peek().is_some_and(|Reverse(worst)| candidate > *worst) {
                heap.pop();
                heap.push(Reverse(candidate));
            }
        }

        let mut ranked: Vec<Ranked> = heap.into_iter().map(|Reverse(r)| r).collect();
        ranked.sort_by(|a, b| b.cmp(a));

        Ok(ranked
            .into_iter()
            .map(|r| QueryResult {
                fragment: Arc::clone(&state.entries[r.position].fragment),
                score: r.score,
            })
            .collect())
    }
}
