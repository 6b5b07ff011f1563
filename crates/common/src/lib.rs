//! Counsel Common Library
//!
//! Core of the Counsel legal question-answering service:
//! - Embedding client abstraction
//! - In-memory vector index and retrieval
//! - Budgeted context assembly
//! - Model backends with ordered fallback
//! - The query orchestrator, plus summaries, analysis and drafting
//! - Error types, configuration, metrics

pub mod config;
pub mod context;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod pipeline;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use index::{Retriever, VectorIndex};
pub use llm::{ModelRegistry, ModelRouter};
pub use models::{AnswerRecord, DocumentFragment, QueryResult, TaskRecord};
pub use pipeline::QueryOrchestrator;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "counsel-hashing-v1";

/// Default embedding dimension (all-MiniLM-L6-v2 compatible)
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
