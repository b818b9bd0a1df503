// ⚠️ Error types for the indexer core

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Debug, Error)]
pub enum IndexerError {
    /// The three views disagree; reconciliation ordering was broken
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

// ============================================================================
// FIELD VALIDATION
// ============================================================================

/// One problem found while validating an incoming record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::new(field, "Required field is missing")
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::missing("version");
        assert_eq!(err.to_string(), "version: Required field is missing");
    }

    #[test]
    fn test_invariant_error_display() {
        let err = IndexerError::InvariantViolation("ranked without ledger entry".to_string());
        assert_eq!(err.to_string(), "invariant violated: ranked without ledger entry");
    }
}
