//! Sync engine error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::cluster::ClusterError;
use crate::db::DatabaseError;

/// The manifest source could not be produced. Fatal for the run.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Git clone failed: {0}")]
    Clone(String),

    #[error("Git network error: {0}")]
    Network(String),

    #[error("Git authentication failed: {0}")]
    AuthFailed(String),

    #[error("Branch '{branch}' not found: {message}")]
    BranchNotFound { branch: String, message: String },

    #[error("Git clone timed out after {0}s")]
    Timeout(u64),

    #[error("Failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Path traversal detected: {0}")]
    PathTraversal(String),
}

/// Classifies git clone stderr into a more specific error variant.
pub fn classify_git_error(stderr: &str, branch: &str) -> FetchError {
    let lower = stderr.to_lowercase();
    let message = stderr.trim().to_string();

    if lower.contains("remote branch") && lower.contains("not found") {
        return FetchError::BranchNotFound {
            branch: branch.to_string(),
            message,
        };
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
        || lower.contains("could not read username")
    {
        return FetchError::AuthFailed(message);
    }

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("couldn't connect to server")
        || lower.contains("the remote end hung up unexpectedly")
    {
        return FetchError::Network(message);
    }

    FetchError::Clone(message)
}

/// A single document or file could not be turned into a manifest.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to read '{file}': {message}")]
    ReadFile { file: String, message: String },

    #[error("Invalid YAML in '{file}' (document {index}): {message}")]
    Yaml {
        file: String,
        index: usize,
        message: String,
    },

    #[error("Document {index} in '{file}' is not a mapping")]
    NotAMapping { file: String, index: usize },

    #[error("Document {index} in '{file}' is missing '{field}'")]
    MissingField {
        file: String,
        index: usize,
        field: &'static str,
    },
}

/// A document could not be applied to the cluster.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Unsupported resource kind: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Top-level failure of a sync run or trigger.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Application {0} not found")]
    NotFound(i64),

    #[error("Application {0} is already syncing")]
    InProgress(i64),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to persist sync state: {0}")]
    Store(#[from] DatabaseError),
}

/// Result type for sync runs.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_missing_branch() {
        let err = classify_git_error(
            "warning: Could not find remote branch nope to clone.\nfatal: Remote branch nope not found in upstream origin",
            "nope",
        );
        assert!(matches!(err, FetchError::BranchNotFound { ref branch, .. } if branch == "nope"));
    }

    #[test]
    fn test_classify_network() {
        let err = classify_git_error(
            "fatal: unable to access 'https://nohost.invalid/x.git/': Could not resolve host: nohost.invalid",
            "main",
        );
        assert!(matches!(err, FetchError::Network(_)));
    }

    #[test]
    fn test_classify_auth() {
        let err = classify_git_error(
            "fatal: Authentication failed for 'https://example.com/x.git/'",
            "main",
        );
        assert!(matches!(err, FetchError::AuthFailed(_)));
    }

    #[test]
    fn test_classify_fallback() {
        let err = classify_git_error("fatal: repository 'x' does not exist\n", "main");
        match err {
            FetchError::Clone(msg) => assert_eq!(msg, "fatal: repository 'x' does not exist"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reconcile_error_wraps_cluster() {
        let err: ReconcileError = ClusterError::Api {
            code: 422,
            message: "invalid".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Cluster API error (422): invalid");
    }
}
