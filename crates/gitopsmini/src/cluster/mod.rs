//! Cluster API seam used by the reconciler and the rollout trigger.
//!
//! Objects cross this boundary as JSON bodies so manifests can be applied
//! verbatim. Implementations must report a missing object as
//! [`ClusterError::NotFound`].

use async_trait::async_trait;
use serde_json::Value;

use crate::gitops::resource::ResourceKind;

pub mod error;
pub mod kubernetes;
pub mod memory;

pub use error::ClusterError;
pub use kubernetes::KubeCluster;
pub use memory::{ClusterCall, InMemoryCluster};

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn read_namespace(&self, name: &str) -> Result<Value, ClusterError>;

    async fn create_namespace(&self, name: &str) -> Result<Value, ClusterError>;

    async fn read(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Value, ClusterError>;

    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        body: &Value,
    ) -> Result<Value, ClusterError>;

    /// Replaces the whole object; fields absent from `body` are dropped.
    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        body: &Value,
    ) -> Result<Value, ClusterError>;
}
