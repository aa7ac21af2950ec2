//! [`ClusterApi`] backed by a live Kubernetes API server.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{ClusterApi, ClusterError};
use crate::gitops::resource::ResourceKind;

/// Typed kube client with a per-call timeout.
pub struct KubeCluster {
    client: Client,
    timeout: Duration,
}

impl KubeCluster {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Builds a client from the local kubeconfig or the in-cluster service account.
    pub async fn try_default(timeout: Duration) -> Result<Self, ClusterError> {
        let client = Client::try_default()
            .await
            .map_err(|e| ClusterError::Client(e.to_string()))?;
        Ok(Self::new(client, timeout))
    }

    async fn bounded<T, F>(
        &self,
        operation: &str,
        kind: &str,
        name: &str,
        fut: F,
    ) -> Result<T, ClusterError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| map_kube_error(e, kind, name)),
            Err(_) => Err(ClusterError::Timeout {
                operation: format!("{} {}/{}", operation, kind, name),
                secs: self.timeout.as_secs(),
            }),
        }
    }

    async fn read_as<K>(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Value, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned + Serialize,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let obj = self
            .bounded("read", kind.as_str(), name, api.get(name))
            .await?;
        to_body(&obj)
    }

    async fn create_as<K>(
        &self,
        kind: ResourceKind,
        namespace: &str,
        body: &Value,
    ) -> Result<Value, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned + Serialize,
        <K as Resource>::DynamicType: Default,
    {
        let obj: K = from_body(body)?;
        let name = obj.meta().name.clone().unwrap_or_default();
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let created = self
            .bounded(
                "create",
                kind.as_str(),
                &name,
                api.create(&PostParams::default(), &obj),
            )
            .await?;
        to_body(&created)
    }

    async fn replace_as<K>(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        body: &Value,
    ) -> Result<Value, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned + Serialize,
        <K as Resource>::DynamicType: Default,
    {
        let obj: K = from_body(body)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let replaced = self
            .bounded(
                "replace",
                kind.as_str(),
                name,
                api.replace(name, &PostParams::default(), &obj),
            )
            .await?;
        to_body(&replaced)
    }
}

fn map_kube_error(err: kube::Error, kind: &str, name: &str) -> ClusterError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => ClusterError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(resp) => ClusterError::Api {
            code: resp.code,
            message: resp.message,
        },
        other => ClusterError::Client(other.to_string()),
    }
}

fn from_body<K: DeserializeOwned>(body: &Value) -> Result<K, ClusterError> {
    serde_json::from_value(body.clone()).map_err(|e| ClusterError::InvalidObject(e.to_string()))
}

fn to_body<K: Serialize>(obj: &K) -> Result<Value, ClusterError> {
    serde_json::to_value(obj).map_err(|e| ClusterError::InvalidObject(e.to_string()))
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn read_namespace(&self, name: &str) -> Result<Value, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = self.bounded("read", "Namespace", name, api.get(name)).await?;
        to_body(&ns)
    }

    async fn create_namespace(&self, name: &str) -> Result<Value, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let created = self
            .bounded(
                "create",
                "Namespace",
                name,
                api.create(&PostParams::default(), &ns),
            )
            .await?;
        to_body(&created)
    }

    async fn read(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Value, ClusterError> {
        match kind {
            ResourceKind::Deployment => self.read_as::<Deployment>(kind, namespace, name).await,
            ResourceKind::Service => self.read_as::<Service>(kind, namespace, name).await,
            ResourceKind::Ingress => self.read_as::<Ingress>(kind, namespace, name).await,
        }
    }

    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        body: &Value,
    ) -> Result<Value, ClusterError> {
        match kind {
            ResourceKind::Deployment => self.create_as::<Deployment>(kind, namespace, body).await,
            ResourceKind::Service => self.create_as::<Service>(kind, namespace, body).await,
            ResourceKind::Ingress => self.create_as::<Ingress>(kind, namespace, body).await,
        }
    }

    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        body: &Value,
    ) -> Result<Value, ClusterError> {
        match kind {
            ResourceKind::Deployment => {
                self.replace_as::<Deployment>(kind, namespace, name, body)
                    .await
            }
            ResourceKind::Service => self.replace_as::<Service>(kind, namespace, name, body).await,
            ResourceKind::Ingress => self.replace_as::<Ingress>(kind, namespace, name, body).await,
        }
    }
}
