//! Git repository operations.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command as TokioCommand;

use super::auth::{build_auth_env, GitCredentials};
use super::parse::{format_git_error, parse_commit_id};
use crate::gitops::error::{classify_git_error, FetchError};
use crate::sanitize::redact_repo_url;

/// A local git working copy.
pub struct GitRepository {
    repo_path: PathBuf,
}

impl GitRepository {
    /// Wraps an existing working copy.
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// Returns the repository path.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Clones the tip of `branch` into `dest` with depth 1.
    ///
    /// `dest` must not exist or be empty. The git process is killed if it
    /// outlives `timeout`.
    pub async fn clone_shallow(
        url: &str,
        branch: &str,
        dest: &Path,
        credentials: &GitCredentials,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let auth = build_auth_env(credentials)?;

        let mut cmd = TokioCommand::new("git");
        cmd.args(["clone", "--quiet", "--depth", "1", "--single-branch", "--branch"])
            .arg(branch)
            .arg("--")
            .arg(url)
            .arg(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &auth.env_vars {
            cmd.env(key, value);
        }

        log::debug!(
            "Cloning {} (branch {}) into {}",
            redact_repo_url(url),
            branch,
            dest.display()
        );

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result.map_err(FetchError::Spawn)?,
            Err(_) => return Err(FetchError::Timeout(timeout.as_secs())),
        };

        // Removes the askpass script.
        drop(auth);

        if output.status.success() {
            Ok(Self::new(dest))
        } else {
            Err(classify_git_error(&format_git_error(&output), branch))
        }
    }

    /// Returns the commit id checked out at `HEAD`, if it can be resolved.
    pub async fn head_commit(&self) -> Option<String> {
        let output = TokioCommand::new("git")
            .current_dir(&self.repo_path)
            .args(["rev-parse", "HEAD"])
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }
        parse_commit_id(&String::from_utf8_lossy(&output.stdout))
    }
}
