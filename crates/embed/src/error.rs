//! Error surface of the embedding client.
use thiserror::Error;

/// Errors produced while turning text into a unit vector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EmbedError {
    /// The client configuration is unusable (missing endpoint, bad dimension).
    #[error("invalid embed config: {0}")]
    InvalidConfig(String),
    /// The remote model failed after all retry attempts.
    #[error("embedding backend error: {0}")]
    Upstream(String),
    /// The backend returned a vector of the wrong length.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// The backend returned NaN or infinite components.
    #[error("embedding contains non-finite values")]
    NonFinite,
    /// The vector has zero norm and cannot be normalized; the caller drops
    /// the record from the dense index.
    #[error("embedding has zero norm")]
    ZeroVector,
}

impl EmbedError {
    /// Only transport/backend failures are worth retrying; validation
    /// failures are deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmbedError::Upstream(_))
    }
}
