//! Error types for the etcd operator

use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Spec validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A dependent object is missing metadata the operator requires
    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The reconciliation pass exceeded its deadline
    #[error("Reconciliation deadline exceeded")]
    DeadlineExceeded(#[from] tokio::time::error::Elapsed),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}
