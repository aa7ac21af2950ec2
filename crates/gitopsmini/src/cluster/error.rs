//! Cluster API error types.

use thiserror::Error;

/// Errors returned by a [`ClusterApi`](super::ClusterApi) implementation.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// The requested object does not exist. Callers branch on this.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("Cluster call '{operation}' timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// The API server rejected the request.
    #[error("Cluster API error ({code}): {message}")]
    Api { code: u16, message: String },

    /// A body could not be converted to or from the typed object.
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// The client could not be constructed or the request never reached the server.
    #[error("Cluster client error: {0}")]
    Client(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}
