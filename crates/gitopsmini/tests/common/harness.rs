//! Test harness for sync engine integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use gitopsmini::cluster::{ClusterApi, ClusterError, InMemoryCluster};
use gitopsmini::db::{Database, DatabaseError};
use gitopsmini::gitops::manifest::{parse_documents, ManifestFile, ManifestSet};
use gitopsmini::gitops::{FetchError, ManifestSource, ResourceKind, SyncEngine};
use gitopsmini::registry::{Application, ApplicationRegistry, NewApplication, SyncStateUpdate};

/// What the scripted source returns for one application.
#[derive(Clone)]
pub enum FakeRepo {
    Files(Vec<(String, String)>),
    MissingBranch,
}

/// A manifest source driven by a per-application script.
#[derive(Default)]
pub struct FakeSource {
    repos: Mutex<HashMap<i64, FakeRepo>>,
    loads: Mutex<Vec<i64>>,
    gate: Mutex<Option<Arc<Notify>>>,
    entered: Arc<Notify>,
}

impl FakeSource {
    pub fn set_files(&self, app_id: i64, files: &[(&str, String)]) {
        let files = files
            .iter()
            .map(|(name, content)| (name.to_string(), content.clone()))
            .collect();
        self.repos
            .lock()
            .unwrap()
            .insert(app_id, FakeRepo::Files(files));
    }

    pub fn set_missing_branch(&self, app_id: i64) {
        self.repos
            .lock()
            .unwrap()
            .insert(app_id, FakeRepo::MissingBranch);
    }

    /// Makes subsequent loads wait until the returned gate is notified.
    pub fn block_loads(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Resolves once a load has started.
    pub async fn wait_until_loading(&self) {
        self.entered.notified().await;
    }

    /// Application ids in load order.
    pub fn loads(&self) -> Vec<i64> {
        self.loads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ManifestSource for FakeSource {
    async fn load(&self, app: &Application) -> Result<ManifestSet, FetchError> {
        self.loads.lock().unwrap().push(app.id);
        self.entered.notify_one();

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let repo = self
            .repos
            .lock()
            .unwrap()
            .get(&app.id)
            .cloned()
            .unwrap_or(FakeRepo::Files(Vec::new()));

        match repo {
            FakeRepo::MissingBranch => Err(FetchError::BranchNotFound {
                branch: app.branch_name.clone(),
                message: format!("Remote branch {} not found", app.branch_name),
            }),
            FakeRepo::Files(mut files) => {
                files.sort_by(|a, b| a.0.cmp(&b.0));
                Ok(ManifestSet {
                    revision: Some("0123456789abcdef".to_string()),
                    files: files
                        .iter()
                        .map(|(name, content)| ManifestFile {
                            name: name.clone(),
                            documents: parse_documents(name, content),
                        })
                        .collect(),
                })
            }
        }
    }
}

/// Registry wrapper that can be told to fail specific calls.
pub struct FlakyRegistry {
    pub inner: Database,
    pub fail_updates: AtomicBool,
    pub fail_listing: AtomicBool,
}

impl FlakyRegistry {
    pub fn new(inner: Database) -> Self {
        Self {
            inner,
            fail_updates: AtomicBool::new(false),
            fail_listing: AtomicBool::new(false),
        }
    }
}

impl ApplicationRegistry for FlakyRegistry {
    fn get(&self, id: i64) -> Result<Option<Application>, DatabaseError> {
        self.inner.get(id)
    }

    fn list_auto_sync_enabled(&self) -> Result<Vec<Application>, DatabaseError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(DatabaseError::LockPoisoned);
        }
        self.inner.list_auto_sync_enabled()
    }

    fn update_sync_state(&self, id: i64, update: &SyncStateUpdate) -> Result<(), DatabaseError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(DatabaseError::LockPoisoned);
        }
        self.inner.update_sync_state(id, update)
    }

    fn record_failure(&self, id: i64, message: &str) -> Result<(), DatabaseError> {
        self.inner.record_failure(id, message)
    }

    fn try_claim_run(&self, id: i64, owner: &str, lease: Duration) -> Result<bool, DatabaseError> {
        self.inner.try_claim_run(id, owner, lease)
    }

    fn release_run(&self, id: i64, owner: &str) -> Result<(), DatabaseError> {
        self.inner.release_run(id, owner)
    }
}

/// Cluster wrapper whose Deployment rollouts (replace calls carrying the
/// restart annotation) always fail.
pub struct RestartRejectingCluster {
    pub inner: Arc<InMemoryCluster>,
    pub rejected: AtomicUsize,
}

#[async_trait]
impl ClusterApi for RestartRejectingCluster {
    async fn read_namespace(&self, name: &str) -> Result<Value, ClusterError> {
        self.inner.read_namespace(name).await
    }

    async fn create_namespace(&self, name: &str) -> Result<Value, ClusterError> {
        self.inner.create_namespace(name).await
    }

    async fn read(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Value, ClusterError> {
        self.inner.read(kind, namespace, name).await
    }

    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        body: &Value,
    ) -> Result<Value, ClusterError> {
        self.inner.create(kind, namespace, body).await
    }

    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        body: &Value,
    ) -> Result<Value, ClusterError> {
        let is_restart = body
            .pointer("/spec/template/metadata/annotations")
            .and_then(|a| a.get("kubectl.kubernetes.io/restartedAt"))
            .is_some();
        if kind == ResourceKind::Deployment && is_restart {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(ClusterError::Api {
                code: 409,
                message: "conflict".to_string(),
            });
        }
        self.inner.replace(kind, namespace, name, body).await
    }
}

/// An engine wired to in-memory collaborators.
pub struct SyncHarness {
    pub db: Database,
    pub cluster: Arc<InMemoryCluster>,
    pub source: Arc<FakeSource>,
    pub engine: Arc<SyncEngine>,
}

impl SyncHarness {
    pub fn new() -> Self {
        let db = Database::open_in_memory().expect("in-memory database");
        let cluster = Arc::new(InMemoryCluster::new());
        let source = Arc::new(FakeSource::default());
        let engine = Arc::new(SyncEngine::new(
            Arc::new(db.clone()),
            source.clone(),
            cluster.clone(),
        ));
        Self {
            db,
            cluster,
            source,
            engine,
        }
    }

    /// Builds a harness around a caller-supplied registry and cluster.
    pub fn with_parts(
        registry: Arc<dyn ApplicationRegistry>,
        cluster: Arc<dyn ClusterApi>,
    ) -> (Arc<FakeSource>, Arc<SyncEngine>) {
        let source = Arc::new(FakeSource::default());
        let engine = Arc::new(SyncEngine::new(registry, source.clone(), cluster));
        (source, engine)
    }

    pub fn register(&self, app: NewApplication) -> Application {
        self.db.insert_application(&app).expect("insert application")
    }

    pub fn reload(&self, id: i64) -> Application {
        self.db.get(id).expect("query").expect("application exists")
    }
}

/// Asserts the persisted state invariants that hold after any run.
pub fn assert_state_consistent(app: &Application) {
    use gitopsmini::{AppStatus, SyncStatus};

    assert_eq!(
        app.error_message.is_some(),
        app.sync_status == SyncStatus::Failed,
        "error_message must be set exactly when sync failed: {:?}",
        app
    );
    let expected_status = match app.sync_status {
        SyncStatus::Success => AppStatus::Active,
        SyncStatus::Failed => AppStatus::Failed,
        SyncStatus::Pending => AppStatus::Pending,
    };
    assert_eq!(app.status, expected_status, "{:?}", app);
}
