//! Legal-document fragments and their embedding vectors

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable fragment identifier.
///
/// Either supplied by the ingester or derived from the fragment's source URL
/// and text, so re-ingesting the same text yields the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(String);

impl FragmentId {
    /// Wrap a caller-supplied identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Content-derived id: first 16 bytes of sha256(source_url || 0x00 || text), hex encoded
    pub fn derive(source_url: &str, text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source_url.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FragmentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FragmentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A bounded chunk of legal text with provenance metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFragment {
    pub id: FragmentId,

    /// Title of the source document (act, judgment, bill)
    pub source_title: String,

    /// Where the source document lives
    pub source_url: String,

    /// Jurisdiction tag, e.g. "kenya"
    pub jurisdiction: String,

    /// Document type: judgment, legislation, bill, gazette notice...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,

    /// Fragment text
    pub text: String,
}

impl DocumentFragment {
    /// Create a fragment with a content-derived id
    pub fn new(
        source_title: impl Into<String>,
        source_url: impl Into<String>,
        jurisdiction: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let source_url = source_url.into();
        let text = text.into();
        Self {
            id: FragmentId::derive(&source_url, &text),
            source_title: source_title.into(),
            source_url,
            jurisdiction: jurisdiction.into(),
            document_type: None,
            text,
        }
    }

    /// Replace the derived id with an explicit one
    pub fn with_id(mut self, id: impl Into<FragmentId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }

    /// Length of the text in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// An embedding tagged with the model (and version) that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub values: Vec<f32>,
    pub model: String,
}

impl EmbeddingVector {
    pub fn new(values: Vec<f32>, model: impl Into<String>) -> Self {
        Self {
            values,
            model: model.into(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}
