//! GitOps synchronization engine.
//!
//! - Manifest source: shallow clone + multi-document YAML parsing
//! - Resource reconciler for Deployment, Service and Ingress
//! - Rollout trigger for reconciled Deployments
//! - Sync orchestrator with per-application run locks
//! - Periodic auto-sync scheduler

pub mod error;
pub mod git;
pub mod loader;
pub mod manifest;
pub mod orchestrator;
pub mod outcome;
pub mod reconciler;
pub mod resource;
pub mod rollout;
pub mod sync_scheduler;

pub use error::{FetchError, ParseError, ReconcileError, Result, SyncError};
pub use git::{GitCredentials, GitRepository};
pub use loader::{GitManifestSource, ManifestSource};
pub use manifest::{ManifestDocument, ManifestFile, ManifestSet};
pub use orchestrator::SyncEngine;
pub use outcome::{DocumentOutcome, OutcomeDetail, SyncRunResult};
pub use reconciler::{Applied, ApplyAction, ResourceReconciler};
pub use resource::ResourceKind;
pub use rollout::restart_deployment;
pub use sync_scheduler::{sweep, AutoSyncScheduler, SweepSummary};
