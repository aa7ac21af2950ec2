//! Application records and the registry the sync engine reads and updates.
//!
//! The engine only ever sees [`Application`] values; the SQLite-backed
//! [`Database`] is one implementation of [`ApplicationRegistry`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::db::app_repo::{self, AppRow, NewAppRow, SyncOutcomeRow};
use crate::db::{Database, DatabaseError};

/// Outcome of the most recent sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        }
    }

    /// The application status that mirrors this sync status.
    pub fn app_status(&self) -> AppStatus {
        match self {
            SyncStatus::Pending => AppStatus::Pending,
            SyncStatus::Success => AppStatus::Active,
            SyncStatus::Failed => AppStatus::Failed,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(other.to_string()),
        }
    }
}

/// Lifecycle status of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Pending,
    Active,
    Failed,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::Pending => "pending",
            AppStatus::Active => "active",
            AppStatus::Failed => "failed",
        }
    }
}

impl FromStr for AppStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppStatus::Pending),
            "active" => Ok(AppStatus::Active),
            "failed" => Ok(AppStatus::Failed),
            other => Err(other.to_string()),
        }
    }
}

/// A registered application: one repository directory bound to one namespace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: i64,
    pub project_name: String,
    pub repo_url: String,
    pub repo_path: String,
    pub branch_name: String,
    pub namespace: String,
    pub description: Option<String>,
    pub auto_sync: bool,
    pub status: AppStatus,
    pub sync_status: SyncStatus,
    pub error_message: Option<String>,
    pub sync_count: i64,
    pub last_sync_duration: Option<i64>,
    pub last_sync: Option<String>,
    pub created_at: String,
}

impl TryFrom<AppRow> for Application {
    type Error = DatabaseError;

    fn try_from(row: AppRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<AppStatus>()
            .map_err(|value| DatabaseError::InvalidColumn {
                column: "status",
                value,
            })?;
        let sync_status = row
            .sync_status
            .parse::<SyncStatus>()
            .map_err(|value| DatabaseError::InvalidColumn {
                column: "sync_status",
                value,
            })?;

        Ok(Self {
            id: row.id,
            project_name: row.project_name,
            repo_url: row.repo_url,
            repo_path: row.repo_path,
            branch_name: row.branch_name,
            namespace: row.namespace,
            description: row.description,
            auto_sync: row.auto_sync,
            status,
            sync_status,
            error_message: row.error_message,
            sync_count: row.sync_count,
            last_sync_duration: row.last_sync_duration,
            last_sync: row.last_sync,
            created_at: row.created_at,
        })
    }
}

/// Fields needed to register an application. Defaults match the `apps` table.
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub project_name: String,
    pub repo_url: String,
    pub repo_path: String,
    pub branch_name: String,
    pub namespace: String,
    pub description: Option<String>,
    pub auto_sync: bool,
}

impl NewApplication {
    pub fn new(project_name: impl Into<String>, repo_url: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            repo_url: repo_url.into(),
            repo_path: "./".to_string(),
            branch_name: "main".to_string(),
            namespace: "default".to_string(),
            description: None,
            auto_sync: false,
        }
    }
}

/// Sync state written when a run completes.
#[derive(Debug, Clone)]
pub struct SyncStateUpdate {
    pub finished_at: DateTime<Utc>,
    pub sync_status: SyncStatus,
    pub duration_ms: u64,
    /// Must be `Some` exactly when `sync_status` is `Failed`.
    pub error_message: Option<String>,
}

/// Store of applications and their sync state.
pub trait ApplicationRegistry: Send + Sync {
    fn get(&self, id: i64) -> Result<Option<Application>, DatabaseError>;

    fn list_auto_sync_enabled(&self) -> Result<Vec<Application>, DatabaseError>;

    /// Persists a completed run. Increments the sync count.
    fn update_sync_state(&self, id: i64, update: &SyncStateUpdate) -> Result<(), DatabaseError>;

    /// Marks the application failed with `message`, leaving counters untouched.
    fn record_failure(&self, id: i64, message: &str) -> Result<(), DatabaseError>;

    /// Claims the application's run slot for `owner` for at most `lease`.
    /// Returns `Ok(false)` while another unexpired claim is held, including
    /// one taken by a different process sharing the store.
    fn try_claim_run(&self, id: i64, owner: &str, lease: Duration) -> Result<bool, DatabaseError>;

    /// Releases a claim taken by `owner`. A claim held by someone else is kept.
    fn release_run(&self, id: i64, owner: &str) -> Result<(), DatabaseError>;
}

/// Registry for dry runs: reads and run claims go to `inner`, sync state
/// writes are dropped.
pub struct DryRunRegistry {
    inner: Arc<dyn ApplicationRegistry>,
}

impl DryRunRegistry {
    pub fn new(inner: Arc<dyn ApplicationRegistry>) -> Self {
        Self { inner }
    }
}

impl ApplicationRegistry for DryRunRegistry {
    fn get(&self, id: i64) -> Result<Option<Application>, DatabaseError> {
        self.inner.get(id)
    }

    fn list_auto_sync_enabled(&self) -> Result<Vec<Application>, DatabaseError> {
        self.inner.list_auto_sync_enabled()
    }

    fn update_sync_state(&self, id: i64, update: &SyncStateUpdate) -> Result<(), DatabaseError> {
        log::info!(
            "Dry run: sync state of app {} not persisted ({})",
            id,
            update.sync_status
        );
        Ok(())
    }

    fn record_failure(&self, id: i64, message: &str) -> Result<(), DatabaseError> {
        log::info!("Dry run: failure of app {} not persisted: {}", id, message);
        Ok(())
    }

    fn try_claim_run(&self, id: i64, owner: &str, lease: Duration) -> Result<bool, DatabaseError> {
        self.inner.try_claim_run(id, owner, lease)
    }

    fn release_run(&self, id: i64, owner: &str) -> Result<(), DatabaseError> {
        self.inner.release_run(id, owner)
    }
}

fn rfc3339_millis(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Database {
    /// Registers a new application and returns it as stored.
    pub fn insert_application(&self, app: &NewApplication) -> Result<Application, DatabaseError> {
        let id = app_repo::insert(
            self,
            &NewAppRow {
                project_name: app.project_name.clone(),
                repo_url: app.repo_url.clone(),
                repo_path: app.repo_path.clone(),
                branch_name: app.branch_name.clone(),
                namespace: app.namespace.clone(),
                description: app.description.clone(),
                auto_sync: app.auto_sync,
            },
        )?;
        self.get(id)?.ok_or(DatabaseError::AppNotFound(id))
    }

    /// Lists every registered application.
    pub fn list_applications(&self) -> Result<Vec<Application>, DatabaseError> {
        app_repo::list_all(self)?
            .into_iter()
            .map(Application::try_from)
            .collect()
    }
}

impl ApplicationRegistry for Database {
    fn get(&self, id: i64) -> Result<Option<Application>, DatabaseError> {
        app_repo::find_by_id(self, id)?
            .map(Application::try_from)
            .transpose()
    }

    /// Rows that cannot be decoded are logged and skipped.
    fn list_auto_sync_enabled(&self) -> Result<Vec<Application>, DatabaseError> {
        let apps = app_repo::list_auto_sync(self)?
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                match Application::try_from(row) {
                    Ok(app) => Some(app),
                    Err(e) => {
                        log::warn!("Skipping application {} in auto-sync listing: {}", id, e);
                        None
                    }
                }
            })
            .collect();
        Ok(apps)
    }

    fn update_sync_state(&self, id: i64, update: &SyncStateUpdate) -> Result<(), DatabaseError> {
        app_repo::record_sync_outcome(
            self,
            id,
            &SyncOutcomeRow {
                last_sync: rfc3339_millis(update.finished_at),
                sync_status: update.sync_status.as_str().to_string(),
                status: update.sync_status.app_status().as_str().to_string(),
                duration_ms: i64::try_from(update.duration_ms).unwrap_or(i64::MAX),
                error_message: update.error_message.clone(),
            },
        )
    }

    fn record_failure(&self, id: i64, message: &str) -> Result<(), DatabaseError> {
        app_repo::record_failure(self, id, message)
    }

    fn try_claim_run(&self, id: i64, owner: &str, lease: Duration) -> Result<bool, DatabaseError> {
        let now = Utc::now();
        let expires_at = TimeDelta::from_std(lease)
            .ok()
            .and_then(|lease| now.checked_add_signed(lease))
            .unwrap_or_else(|| now + TimeDelta::days(365));
        app_repo::try_claim_run(
            self,
            id,
            owner,
            &rfc3339_millis(now),
            &rfc3339_millis(expires_at),
        )
    }

    fn release_run(&self, id: i64, owner: &str) -> Result<(), DatabaseError> {
        app_repo::release_run(self, id, owner)
    }
}
