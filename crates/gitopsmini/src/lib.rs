pub mod cluster;
pub mod config;
pub mod db;
pub mod error;
pub mod gitops;
pub mod logging;
pub mod registry;
pub mod sanitize;

pub use cluster::{ClusterApi, ClusterError, InMemoryCluster, KubeCluster};
pub use config::{load_config, EngineConfig, LogFormat};
pub use db::{Database, DatabaseError};
pub use error::ConfigError;
pub use gitops::{
    AutoSyncScheduler, GitCredentials, GitManifestSource, ManifestSource, SyncEngine, SyncError,
    SyncRunResult,
};
pub use registry::{
    AppStatus, Application, ApplicationRegistry, DryRunRegistry, NewApplication, SyncStatus,
};
