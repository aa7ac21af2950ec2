//! Sync orchestrator: one end-to-end run for one application.
//!
//! fetch → apply every document → restart reconciled Deployments → persist.
//! Only a fetch failure aborts a run; document failures are collected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::Instrument;

use super::error::{Result, SyncError};
use super::loader::ManifestSource;
use super::manifest::ManifestSet;
use super::outcome::{DocumentOutcome, SyncRunResult};
use super::reconciler::ResourceReconciler;
use super::resource::ResourceKind;
use super::rollout::restart_deployment;
use crate::cluster::ClusterApi;
use crate::registry::{Application, ApplicationRegistry, SyncStateUpdate};
use crate::sanitize::redact_repo_url;

/// Upper bound on how long a run claim survives a process that died mid-run.
pub const DEFAULT_RUN_LEASE: Duration = Duration::from_secs(3600);

/// Drives sync runs. One run per application at a time, across every
/// engine sharing the same registry.
pub struct SyncEngine {
    registry: Arc<dyn ApplicationRegistry>,
    source: Arc<dyn ManifestSource>,
    cluster: Arc<dyn ClusterApi>,
    /// Per-application run locks. Entries are dropped when idle.
    run_locks: StdMutex<HashMap<i64, Arc<Mutex<()>>>>,
    run_lease: Duration,
}

impl SyncEngine {
    pub fn new(
        registry: Arc<dyn ApplicationRegistry>,
        source: Arc<dyn ManifestSource>,
        cluster: Arc<dyn ClusterApi>,
    ) -> Self {
        Self {
            registry,
            source,
            cluster,
            run_locks: StdMutex::new(HashMap::new()),
            run_lease: DEFAULT_RUN_LEASE,
        }
    }

    /// Sets how long a run claim stays valid in the registry.
    pub fn with_run_lease(mut self, lease: Duration) -> Self {
        self.run_lease = lease;
        self
    }

    pub fn registry(&self) -> &Arc<dyn ApplicationRegistry> {
        &self.registry
    }

    /// Looks the application up and runs a sync for it.
    pub async fn trigger_sync(&self, app_id: i64) -> Result<SyncRunResult> {
        let app = self
            .registry
            .get(app_id)?
            .ok_or(SyncError::NotFound(app_id))?;
        self.run(&app).await
    }

    /// Runs one sync for `app`.
    ///
    /// Returns [`SyncError::InProgress`] without touching any sync state if
    /// a run for the same application is already underway, in this engine
    /// or in another process sharing the registry.
    pub async fn run(&self, app: &Application) -> Result<SyncRunResult> {
        let lock = self.lock_for(app.id);
        let result = match Arc::clone(&lock).try_lock_owned() {
            Ok(guard) => {
                let result = self.run_claimed(app).await;
                drop(guard);
                result
            }
            Err(_) => {
                log::info!("Sync skipped for app {}: a run is already in progress", app.id);
                Err(SyncError::InProgress(app.id))
            }
        };
        self.forget_lock(app.id, lock);
        result
    }

    async fn run_claimed(&self, app: &Application) -> Result<SyncRunResult> {
        let run_id = uuid::Uuid::new_v4().to_string();
        if !self.registry.try_claim_run(app.id, &run_id, self.run_lease)? {
            log::info!(
                "Sync skipped for app {}: another process is running it",
                app.id
            );
            return Err(SyncError::InProgress(app.id));
        }

        let span = tracing::info_span!(
            "sync.run",
            app_id = app.id,
            run_id = %run_id,
            repo = %redact_repo_url(&app.repo_url),
            branch = %app.branch_name,
        );
        let result = self.execute(app, run_id.clone()).instrument(span).await;

        if let Err(e) = self.registry.release_run(app.id, &run_id) {
            log::warn!(
                "Failed to release run claim for app {}: {} (expires on its own)",
                app.id,
                e
            );
        }
        result
    }

    fn lock_for(&self, app_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.run_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(app_id).or_default())
    }

    /// Removes the map entry once nobody but the map and `lock` refer to it.
    fn forget_lock(&self, app_id: i64, lock: Arc<Mutex<()>>) {
        let mut locks = self.run_locks.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&app_id);
        }
    }


    async fn execute(&self, app: &Application, run_id: String) -> Result<SyncRunResult> {
        let started = Instant::now();
        log::info!("Sync started for app {} ({})", app.id, app.project_name);

        let manifests = match self.source.load(app).await {
            Ok(manifests) => manifests,
            Err(e) => {
                log::error!("Sync aborted for app {}: {}", app.id, e);
                if let Err(store_err) = self.registry.record_failure(app.id, &e.to_string()) {
                    log::error!(
                        "Failed to record fetch failure for app {}: {}",
                        app.id,
                        store_err
                    );
                }
                return Err(SyncError::Fetch(e));
            }
        };

        let revision = manifests.revision.clone();
        let (outcomes, deployments) = self.apply_all(app, manifests).await;
        let restarted = self.restart_all(app, &deployments).await;

        let status = SyncRunResult::derive_status(&outcomes);
        let mut result = SyncRunResult {
            app_id: app.id,
            run_id,
            revision,
            status,
            duration_ms: 0,
            outcomes,
            restarted,
        };
        result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let update = SyncStateUpdate {
            finished_at: Utc::now(),
            sync_status: result.status,
            duration_ms: result.duration_ms,
            error_message: result.failure_summary(),
        };
        if let Err(e) = self.registry.update_sync_state(app.id, &update) {
            log::error!("Failed to persist sync state for app {}: {}", app.id, e);
            let message = format!("Failed to persist sync state: {}", e);
            if let Err(fallback_err) = self.registry.record_failure(app.id, &message) {
                log::error!(
                    "Failed to record failure state for app {}: {}",
                    app.id,
                    fallback_err
                );
            }
            return Err(SyncError::Store(e));
        }

        log::info!(
            "Sync finished for app {}: {} ({} of {} manifests failed, {} ms)",
            app.id,
            result.status,
            result.failed_count(),
            result.outcomes.len(),
            result.duration_ms
        );
        Ok(result)
    }

    /// Applies every document in source order. Returns the outcomes and the
    /// distinct Deployments that were reconciled successfully.
    async fn apply_all(
        &self,
        app: &Application,
        manifests: ManifestSet,
    ) -> (Vec<DocumentOutcome>, Vec<String>) {
        let mut reconciler = ResourceReconciler::new(self.cluster.as_ref());
        let mut outcomes = Vec::with_capacity(manifests.document_count());
        let mut deployments: Vec<String> = Vec::new();

        for file in manifests.files {
            for entry in file.documents {
                let doc = match entry {
                    Ok(doc) => doc,
                    Err(e) => {
                        log::warn!("Skipping document in {}: {}", file.name, e);
                        outcomes.push(DocumentOutcome::unparsed(&file.name, &e));
                        continue;
                    }
                };

                match reconciler.apply(&doc, &app.namespace).await {
                    Ok(applied) => {
                        if applied.kind == ResourceKind::Deployment
                            && !deployments.contains(&doc.name)
                        {
                            deployments.push(doc.name.clone());
                        }
                        outcomes.push(DocumentOutcome::applied(&doc, applied));
                    }
                    Err(e) => {
                        log::warn!(
                            "Failed to apply {}/{} from {}: {}",
                            doc.kind,
                            doc.name,
                            doc.file,
                            e
                        );
                        outcomes.push(DocumentOutcome::rejected(&doc, &e));
                    }
                }
            }
        }

        (outcomes, deployments)
    }

    /// Restarts each Deployment. Failures are logged and do not affect the run.
    async fn restart_all(&self, app: &Application, deployments: &[String]) -> Vec<String> {
        let mut restarted = Vec::new();
        for name in deployments {
            match restart_deployment(self.cluster.as_ref(), name, &app.namespace).await {
                Ok(_) => {
                    log::info!("Triggered rollout of Deployment {}/{}", app.namespace, name);
                    restarted.push(name.clone());
                }
                Err(e) => log::warn!(
                    "Rollout of Deployment {}/{} failed: {}",
                    app.namespace,
                    name,
                    e
                ),
            }
        }
        restarted
    }
}
