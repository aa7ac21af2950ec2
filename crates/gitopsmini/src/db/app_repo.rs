//! Application repository: CRUD operations for the `apps` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw application row from the database.
#[derive(Debug, Clone)]
pub struct AppRow {
    pub id: i64,
    pub project_name: String,
    pub repo_url: String,
    pub repo_path: String,
    pub branch_name: String,
    pub namespace: String,
    pub description: Option<String>,
    pub auto_sync: bool,
    pub status: String,
    pub sync_status: String,
    pub error_message: Option<String>,
    pub sync_count: i64,
    pub last_sync_duration: Option<i64>,
    pub last_sync: Option<String>,
    pub created_at: String,
}

impl AppRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            project_name: row.get("project_name")?,
            repo_url: row.get("repo_url")?,
            repo_path: row.get("repo_path")?,
            branch_name: row.get("branch_name")?,
            namespace: row.get("namespace")?,
            description: row.get("description")?,
            auto_sync: row.get("auto_sync")?,
            status: row.get("status")?,
            sync_status: row.get("sync_status")?,
            error_message: row.get("error_message")?,
            sync_count: row.get("sync_count")?,
            last_sync_duration: row.get("last_sync_duration")?,
            last_sync: row.get("last_sync")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Fields supplied when registering an application.
#[derive(Debug, Clone)]
pub struct NewAppRow {
    pub project_name: String,
    pub repo_url: String,
    pub repo_path: String,
    pub branch_name: String,
    pub namespace: String,
    pub description: Option<String>,
    pub auto_sync: bool,
}

/// Sync-state columns written at the end of a completed run.
#[derive(Debug, Clone)]
pub struct SyncOutcomeRow {
    pub last_sync: String,
    pub sync_status: String,
    pub status: String,
    pub duration_ms: i64,
    pub error_message: Option<String>,
}

/// Inserts a new application and returns its id.
pub fn insert(db: &Database, app: &NewAppRow) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO apps (project_name, repo_url, repo_path, branch_name, namespace,
             description, auto_sync)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                app.project_name,
                app.repo_url,
                app.repo_path,
                app.branch_name,
                app.namespace,
                app.description,
                app.auto_sync,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds an application by its id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<AppRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM apps WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], AppRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists every application, oldest first.
pub fn list_all(db: &Database) -> Result<Vec<AppRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM apps ORDER BY id")?;
        let rows = stmt
            .query_map([], AppRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists applications with auto-sync enabled, oldest first.
pub fn list_auto_sync(db: &Database) -> Result<Vec<AppRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM apps WHERE auto_sync = 1 ORDER BY id")?;
        let rows = stmt
            .query_map([], AppRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Writes the outcome of a completed run and bumps `sync_count`, in one statement.
pub fn record_sync_outcome(
    db: &Database,
    id: i64,
    outcome: &SyncOutcomeRow,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE apps SET last_sync = ?2, sync_status = ?3, status = ?4,
             sync_count = sync_count + 1, last_sync_duration = ?5, error_message = ?6
             WHERE id = ?1",
            params![
                id,
                outcome.last_sync,
                outcome.sync_status,
                outcome.status,
                outcome.duration_ms,
                outcome.error_message,
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::AppNotFound(id));
        }
        Ok(())
    })
}

/// Marks an application failed without touching its counters or timestamps.
pub fn record_failure(db: &Database, id: i64, message: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE apps SET sync_status = 'failed', status = 'failed', error_message = ?2
             WHERE id = ?1",
            params![id, message],
        )?;
        if changed == 0 {
            return Err(DatabaseError::AppNotFound(id));
        }
        Ok(())
    })
}

/// Claims the run slot of application `id` for `owner` until `expires_at`.
///
/// Succeeds when no claim is held or the held one expired before `now`.
/// Timestamps are RFC 3339 UTC strings of equal precision so they compare
/// as text. Returns `Ok(false)` while another claim is live.
pub fn try_claim_run(
    db: &Database,
    id: i64,
    owner: &str,
    now: &str,
    expires_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE apps SET run_owner = ?2, run_expires_at = ?4
             WHERE id = ?1 AND (run_owner IS NULL OR run_expires_at IS NULL OR run_expires_at < ?3)",
            params![id, owner, now, expires_at],
        )?;
        if changed == 1 {
            return Ok(true);
        }

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM apps WHERE id = ?1)",
            params![id],
            |r| r.get(0),
        )?;
        if exists {
            Ok(false)
        } else {
            Err(DatabaseError::AppNotFound(id))
        }
    })
}

/// Drops the run claim of application `id` if `owner` still holds it.
pub fn release_run(db: &Database, id: i64, owner: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE apps SET run_owner = NULL, run_expires_at = NULL
             WHERE id = ?1 AND run_owner = ?2",
            params![id, owner],
        )?;
        Ok(())
    })
}
