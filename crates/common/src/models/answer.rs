//! Search results and the answer record returned to callers

use super::fragment::{DocumentFragment, FragmentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// One nearest-neighbour hit. Shares the stored fragment rather than copying it.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub fragment: Arc<DocumentFragment>,

    /// Similarity in [0, 1], higher is closer
    pub score: f32,
}

/// Final state of a processed query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Completed,
    Degraded,
}

/// A source cited by an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub fragment_id: FragmentId,
    pub title: String,
    pub url: String,
    pub jurisdiction: String,
    pub score: f32,
}

impl SourceCitation {
    pub fn from_fragment(fragment: &DocumentFragment, score: f32) -> Self {
        Self {
            fragment_id: fragment.id.clone(),
            title: fragment.source_title.clone(),
            url: fragment.source_url.clone(),
            jurisdiction: fragment.jurisdiction.clone(),
            score,
        }
    }
}

/// The unit returned to the caller for every well-formed query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub query_id: Uuid,

    pub query: String,

    pub answer: String,

    /// Cited sources, in prompt order
    pub sources: Vec<SourceCitation>,

    /// 0.0 when degraded
    pub confidence: f32,

    /// Model that produced the answer; `None` when every candidate failed
    pub model_used: Option<String>,

    pub success: bool,

    pub status: AnswerStatus,

    pub answered_at: DateTime<Utc>,

    pub processing_time_ms: u64,
}

impl AnswerRecord {
    pub fn is_degraded(&self) -> bool {
        self.status == AnswerStatus::Degraded
    }
}
