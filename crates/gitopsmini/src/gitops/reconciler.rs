//! Resource reconciler: makes one cluster object match one manifest.
//!
//! Objects are upserted wholesale. A manifest that exists in the cluster is
//! replaced with the document body as written, so fields the manifest omits
//! (including ones filled in by other controllers) are dropped.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use super::error::ReconcileError;
use super::manifest::ManifestDocument;
use super::resource::ResourceKind;
use crate::cluster::{ClusterApi, ClusterError};

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyAction {
    Created,
    Replaced,
}

/// A successfully applied document.
#[derive(Debug, Clone)]
pub struct Applied {
    pub kind: ResourceKind,
    pub action: ApplyAction,
    /// The object as returned by the cluster.
    pub object: Value,
}

/// Applies documents for one run. Namespaces are ensured at most once per run.
pub struct ResourceReconciler<'a> {
    cluster: &'a dyn ClusterApi,
    ensured_namespaces: HashSet<String>,
}

impl<'a> ResourceReconciler<'a> {
    pub fn new(cluster: &'a dyn ClusterApi) -> Self {
        Self {
            cluster,
            ensured_namespaces: HashSet::new(),
        }
    }

    /// Reads the namespace and creates it if missing.
    ///
    /// Only a success is remembered, so a failed ensure is retried by the
    /// next document targeting the same namespace.
    pub async fn ensure_namespace(&mut self, namespace: &str) -> Result<(), ClusterError> {
        if self.ensured_namespaces.contains(namespace) {
            return Ok(());
        }

        match self.cluster.read_namespace(namespace).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                log::info!("Creating namespace '{}'", namespace);
                self.cluster.create_namespace(namespace).await?;
            }
            Err(e) => return Err(e),
        }

        self.ensured_namespaces.insert(namespace.to_string());
        Ok(())
    }

    /// Makes the cluster object named by `doc` match it in `namespace`.
    pub async fn apply(
        &mut self,
        doc: &ManifestDocument,
        namespace: &str,
    ) -> Result<Applied, ReconcileError> {
        let kind = doc
            .kind
            .parse::<ResourceKind>()
            .map_err(ReconcileError::Unsupported)?;

        self.ensure_namespace(namespace).await?;

        let (action, object) = self.upsert(kind, namespace, doc).await?;

        log::info!(
            "{} {}/{} in namespace '{}'",
            match action {
                ApplyAction::Created => "Created",
                ApplyAction::Replaced => "Replaced",
            },
            kind,
            doc.name,
            namespace
        );

        Ok(Applied {
            kind,
            action,
            object,
        })
    }

    async fn upsert(
        &self,
        kind: ResourceKind,
        namespace: &str,
        doc: &ManifestDocument,
    ) -> Result<(ApplyAction, Value), ClusterError> {
        match self.cluster.read(kind, namespace, &doc.name).await {
            Ok(_) => {
                let object = self
                    .cluster
                    .replace(kind, namespace, &doc.name, &doc.body)
                    .await?;
                Ok((ApplyAction::Replaced, object))
            }
            Err(e) if e.is_not_found() => {
                let object = self.cluster.create(kind, namespace, &doc.body).await?;
                Ok((ApplyAction::Created, object))
            }
            Err(e) => Err(e),
        }
    }
}
