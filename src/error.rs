//! Error types for Proctor Flux
//!
//! Capture and extraction are total and never produce these errors. They cover
//! the edges of the crate: parsing host input, loading configuration, and
//! talking to the scoring endpoint.

use thiserror::Error;

/// Errors that can occur outside the extraction core
#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Submission failed: {0}")]
    TransportError(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Window has no question index")]
    MissingQuestionIndex,

    #[error("Layout mismatch: expected {expected}, got {actual}")]
    LayoutMismatch { expected: String, actual: String },
}
