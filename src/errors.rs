//! Error types for tfgrpo
//!
//! Every public operation surfaces one of these variants. Callers that need to
//! branch on the outcome use [`GrpoError::kind`] rather than matching strings.

use thiserror::Error;

/// Coarse classification of an error, stable across variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or an operation not allowed in the current state
    Validation,
    /// Unknown episode or experience id
    NotFound,
    /// The model could not produce a usable decision
    Extraction,
    /// The durable library could not be read or written
    Storage,
    /// Missing credential or unreadable configuration
    Config,
    /// One failed model exchange (retried before it becomes `Extraction`)
    Transport,
}

/// Main error type for episode tracking and the experience library
#[derive(Error, Debug)]
pub enum GrpoError {
    /// Input rejected or operation invalid for the current episode state
    #[error("Validation error: {0}")]
    Validation(String),

    /// Lookup of an unknown id
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Model call or decision parsing failed after every allowed attempt
    #[error("Extraction failed after {attempts} attempt(s): {reason}")]
    Extraction { attempts: u32, reason: String },

    /// Durable record read/write failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Non-success answer from the model endpoint
    #[error("Model API error: {0}")]
    ModelApi(String),

    /// A single model reply that does not match the decision schema
    #[error("Malformed decision: {0}")]
    MalformedDecision(String),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for tfgrpo operations
pub type Result<T> = std::result::Result<T, GrpoError>;

impl GrpoError {
    /// Shorthand for an unknown episode id
    pub fn episode_not_found(id: impl Into<String>) -> Self {
        GrpoError::NotFound {
            kind: "Episode",
            id: id.into(),
        }
    }

    /// Shorthand for an unknown experience id
    pub fn experience_not_found(id: impl Into<String>) -> Self {
        GrpoError::NotFound {
            kind: "Experience",
            id: id.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GrpoError::Validation(_) => ErrorKind::Validation,
            GrpoError::NotFound { .. } => ErrorKind::NotFound,
            GrpoError::Extraction { .. } => ErrorKind::Extraction,
            GrpoError::Storage(_) | GrpoError::Io(_) => ErrorKind::Storage,
            GrpoError::Config(_) => ErrorKind::Config,
            GrpoError::ModelApi(_)
            | GrpoError::MalformedDecision(_)
            | GrpoError::Timeout { .. }
            | GrpoError::Http(_)
            | GrpoError::Serialization(_) => ErrorKind::Transport,
        }
    }
}
