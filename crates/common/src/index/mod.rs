//! Vector index and retrieval
//!
//! Provides:
//! - An append-friendly in-memory vector index (flat scan, bounded top-k)
//! - The `Retriever` seam the query pipeline depends on
//! - The ingestion boundary that embeds and upserts fragments

mod ingest;
mod retriever;
mod vector;

pub use ingest::{IngestItem, IngestReport, Ingestor, RejectedFragment};
pub use retriever::{Retriever, SearchFilter, VectorRetriever};
pub use vector::{SimilarityMetric, UpsertOutcome, VectorIndex};
