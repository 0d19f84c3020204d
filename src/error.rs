//! Error types for the schema registry and the validation pipeline

use thiserror::Error;

/// Result type for schema store operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema store errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema not found: {id}")]
    NotFound { id: String },

    #[error("Checksum mismatch for schema {id} v{version}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        id: String,
        version: u32,
        expected: String,
        actual: String,
    },

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Failures inside the routing and recovery pipeline.
///
/// None of these ever abort a batch: callers resolve each one into a
/// destination topic for the message at hand.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Missing message metadata: {0}")]
    Metadata(String),

    #[error("Schema registry lookup failed: {0}")]
    Lookup(String),

    #[error("Schema {id} version {version} not found")]
    NotFound { id: String, version: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Validator failed: {0}")]
    ValidationExecution(String),

    #[error("Transmission to {topic} failed: {reason}")]
    Transmission { topic: String, reason: String },

    #[error("Unknown message format: {0}")]
    UnknownFormat(String),

    #[error("Schema inference failed: {0}")]
    Inference(String),

    #[error("Receiving messages failed: {0}")]
    Receive(String),
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Lookup(err.to_string())
    }
}

impl From<base64::DecodeError> for PipelineError {
    fn from(err: base64::DecodeError) -> Self {
        PipelineError::Decode(err.to_string())
    }
}
