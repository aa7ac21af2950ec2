//! Manifest source: produces the parsed manifests for one application.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::error::FetchError;
use super::git::{GitCredentials, GitRepository};
use super::manifest::{read_manifest_dir, ManifestSet};
use crate::registry::Application;

/// Anything that can produce the manifests an application points at.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetches the application's repository and parses its manifest directory.
    async fn load(&self, app: &Application) -> Result<ManifestSet, FetchError>;
}

/// Fresh shallow clone per run into `<repos_dir>/<app id>`.
pub struct GitManifestSource {
    repos_dir: PathBuf,
    credentials: GitCredentials,
    timeout: Duration,
}

impl GitManifestSource {
    pub fn new(repos_dir: impl Into<PathBuf>, credentials: GitCredentials, timeout: Duration) -> Self {
        Self {
            repos_dir: repos_dir.into(),
            credentials,
            timeout,
        }
    }

    /// Working copy location for an application.
    pub fn working_copy(&self, app_id: i64) -> PathBuf {
        self.repos_dir.join(app_id.to_string())
    }

    async fn reset_working_copy(&self, dest: &Path) -> Result<(), FetchError> {
        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(dest)
                .await
                .map_err(|e| FetchError::Io {
                    path: dest.to_path_buf(),
                    source: e,
                })?;
        }
        tokio::fs::create_dir_all(&self.repos_dir)
            .await
            .map_err(|e| FetchError::Io {
                path: self.repos_dir.clone(),
                source: e,
            })
    }
}

#[async_trait]
impl ManifestSource for GitManifestSource {
    async fn load(&self, app: &Application) -> Result<ManifestSet, FetchError> {
        let dest = self.working_copy(app.id);
        self.reset_working_copy(&dest).await?;

        let repo = GitRepository::clone_shallow(
            &app.repo_url,
            &app.branch_name,
            &dest,
            &self.credentials,
            self.timeout,
        )
        .await?;
        let revision = repo.head_commit().await;

        let manifest_dir = resolve_manifest_dir(repo.repo_path(), &app.repo_path)?;
        let files = tokio::task::spawn_blocking(move || read_manifest_dir(&manifest_dir))
            .await
            .map_err(|e| FetchError::Io {
                path: dest.clone(),
                source: std::io::Error::other(e),
            })??;

        Ok(ManifestSet { revision, files })
    }
}

/// Joins `relative` onto `root`, refusing any path that climbs out of `root`.
/// A leading `/` is treated as the repository root.
pub fn resolve_manifest_dir(root: &Path, relative: &str) -> Result<PathBuf, FetchError> {
    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(relative).components() {
        match component {
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                if depth == 0 {
                    return Err(FetchError::PathTraversal(relative.to_string()));
                }
                resolved.pop();
                depth -= 1;
            }
        }
    }

    Ok(resolved)
}
