//! Error types for lead qualification.
//!
//! Library crates use [`LeadQualError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level error type for all lead qualification operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadQualError {
    /// Invalid or missing configuration. Fatal: aborts a run before any lead is processed.
    #[error("config error: {message}")]
    Config { message: String },

    /// Enrichment or LLM provider call failure.
    #[error("provider error: {0}")]
    Provider(ProviderError),

    /// Structured output failed schema validation.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Record store read/write failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A concurrent run created the same lead identity between find and create.
    #[error("identity conflict: {identity} already exists in {table}")]
    IdentityConflict { table: String, identity: String },

    /// Task graph construction or execution failure (cycle, missing input, unknown offer).
    #[error("pipeline error: {message}")]
    Pipeline { message: String },

    /// Lead ingestion failure (unreadable file, missing required columns).
    #[error("ingest error: {message}")]
    Ingest { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadQualError>;

impl LeadQualError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a pipeline error from any displayable message.
    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline {
            message: msg.into(),
        }
    }

    /// Create an ingest error from any displayable message.
    pub fn ingest(msg: impl Into<String>) -> Self {
        Self::Ingest {
            message: msg.into(),
        }
    }

    /// Create a provider error for the named provider.
    pub fn provider(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider(ProviderError::new(provider, msg))
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

impl From<ProviderError> for LeadQualError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

/// A non-fatal provider failure, attached to the result that degraded because of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    /// Provider name (`profile`, `company`, `research`, `llm`).
    pub provider: String,
    /// Human-readable failure description.
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.message)
    }
}

impl std::error::Error for ProviderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LeadQualError::config("category weights sum to 90, expected 100");
        assert_eq!(
            err.to_string(),
            "config error: category weights sum to 90, expected 100"
        );

        let err = LeadQualError::provider("profile", "HTTP 429");
        assert_eq!(err.to_string(), "provider error: profile: HTTP 429");

        let err = LeadQualError::IdentityConflict {
            table: "Leads".into(),
            identity: "email:ada@example.com".into(),
        };
        assert!(err.to_string().contains("email:ada@example.com"));
    }

    #[test]
    fn only_persistence_is_transient() {
        assert!(LeadQualError::Persistence("database is locked".into()).is_transient());
        assert!(!LeadQualError::validation("bad json").is_transient());
        assert!(!LeadQualError::config("missing").is_transient());
    }
}
