//! Error types for the signed schema store

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema store errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Invalid schema definition: {0}")]
    InvalidDefinition(String),

    #[error("Signature {0} is protected and cannot be modified or removed")]
    ProtectedSignature(String),

    #[error("Cannot resolve referenced schema: {0}")]
    UnresolvableSchema(String),

    #[error("Schema not found for signature {signature}")]
    NotFound { signature: String },

    #[error("Signature mismatch: key {expected} does not match content signature {actual}")]
    SignatureMismatch { expected: String, actual: String },

    #[error("Archive record {line}: {message}")]
    Archive { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl SchemaError {
    pub(crate) fn not_found(signature: impl Into<String>) -> Self {
        SchemaError::NotFound {
            signature: signature.into(),
        }
    }
}
