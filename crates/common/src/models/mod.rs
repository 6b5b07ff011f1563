//! Core data model for the query pipeline
//!
//! Fragments are created by the external ingestion collaborator and are
//! immutable once stored; everything else here is produced per request.

mod answer;
mod fragment;
mod task;

pub use answer::{AnswerRecord, AnswerStatus, QueryResult, SourceCitation};
pub use fragment::{DocumentFragment, EmbeddingVector, FragmentId};
pub use task::{DocumentKind, TaskKind, TaskRecord};
