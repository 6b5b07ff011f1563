//! Query text validation

use crate::errors::{AppError, Result};
use regex_lite::Regex;

/// Markup and script fragments that have no place in a legal question
const INJECTION_PATTERN: &str = r"(?i)<script[^>]*>|javascript:|vbscript:|on(load|error|click)\s*=|<(iframe|object|embed|form|input)[^>]*>|eval\s*\(|document\.cookie|window\.location";

/// Rejects empty, oversized and script-bearing queries
pub struct QueryValidator {
    max_chars: usize,
    injection: Regex,
}

impl QueryValidator {
    pub fn new(max_chars: usize) -> Result<Self> {
        let injection = Regex::new(INJECTION_PATTERN).map_err(|e| AppError::Internal {
            message: format!("invalid injection pattern: {}", e),
        })?;
        Ok(Self { max_chars, injection })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Validate and return the trimmed query
    pub fn validate<'q>(&self, query: &'q str) -> Result<&'q str> {
        let trimmed = query.trim();

        if trimmed.is_empty() {
            return Err(AppError::InvalidInput {
                message: "Query cannot be empty".to_string(),
                field: Some("query".to_string()),
            });
        }

        let chars = trimmed.chars().count();
        if chars > self.max_chars {
            return Err(AppError::InvalidInput {
                message: format!(
                    "Query is {} characters, maximum is {}",
                    chars, self.max_chars
                ),
                field: Some("query".to_string()),
            });
        }

        if self.injection.is_match(trimmed) {
            return Err(AppError::InvalidInput {
                message: "Query contains disallowed markup or script content".to_string(),
                field: Some("query".to_string()),
            });
        }

        Ok(trimmed)
    }
}
