//! In-process cluster that keeps objects in a map and records every call.
//!
//! Backs `--dry-run` syncs and the engine's tests.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ClusterApi, ClusterError};
use crate::gitops::resource::ResourceKind;

/// One recorded call against an [`InMemoryCluster`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    ReadNamespace(String),
    CreateNamespace(String),
    Read {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },
    Create {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },
    Replace {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },
}

type ObjectKey = (ResourceKind, String, String);

#[derive(Default)]
struct State {
    namespaces: BTreeSet<String>,
    objects: BTreeMap<ObjectKey, Value>,
    calls: Vec<ClusterCall>,
    failing: HashSet<String>,
}

/// A [`ClusterApi`] held entirely in memory.
#[derive(Default)]
pub struct InMemoryCluster {
    state: Mutex<State>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call naming `name` (object or namespace) fail with a 500.
    pub fn fail_on(&self, name: &str) {
        self.lock().failing.insert(name.to_string());
    }

    /// Seeds an object without recording a call.
    pub fn insert(&self, kind: ResourceKind, namespace: &str, name: &str, body: Value) {
        self.lock()
            .objects
            .insert((kind, namespace.to_string(), name.to_string()), body);
    }

    pub fn object(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<Value> {
        self.lock()
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.lock().namespaces.contains(name)
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.lock().calls.clone()
    }

    /// Number of replace calls made against one object.
    pub fn replace_count(&self, kind: ResourceKind, namespace: &str, name: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| {
                matches!(c, ClusterCall::Replace { kind: k, namespace: ns, name: n }
                    if *k == kind && ns == namespace && n == name)
            })
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl State {
    fn check(&self, name: &str) -> Result<(), ClusterError> {
        if self.failing.contains(name) {
            return Err(ClusterError::Api {
                code: 500,
                message: format!("injected failure for '{}'", name),
            });
        }
        Ok(())
    }
}

fn body_name(body: &Value) -> Result<String, ClusterError> {
    body.pointer("/metadata/name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ClusterError::InvalidObject("metadata.name is required".to_string()))
}

#[async_trait]
impl ClusterApi for InMemoryCluster {
    async fn read_namespace(&self, name: &str) -> Result<Value, ClusterError> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::ReadNamespace(name.to_string()));
        state.check(name)?;
        if state.namespaces.contains(name) {
            Ok(json!({ "apiVersion": "v1", "kind": "Namespace", "metadata": { "name": name } }))
        } else {
            Err(ClusterError::NotFound {
                kind: "Namespace".to_string(),
                name: name.to_string(),
            })
        }
    }

    async fn create_namespace(&self, name: &str) -> Result<Value, ClusterError> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::CreateNamespace(name.to_string()));
        state.check(name)?;
        if !state.namespaces.insert(name.to_string()) {
            return Err(ClusterError::Api {
                code: 409,
                message: format!("namespace '{}' already exists", name),
            });
        }
        Ok(json!({ "apiVersion": "v1", "kind": "Namespace", "metadata": { "name": name } }))
    }

    async fn read(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Value, ClusterError> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::Read {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        state.check(name)?;
        state
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            })
    }

    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        body: &Value,
    ) -> Result<Value, ClusterError> {
        let name = body_name(body)?;
        let mut state = self.lock();
        state.calls.push(ClusterCall::Create {
            kind,
            namespace: namespace.to_string(),
            name: name.clone(),
        });
        state.check(&name)?;
        let key = (kind, namespace.to_string(), name.clone());
        if state.objects.contains_key(&key) {
            return Err(ClusterError::Api {
                code: 409,
                message: format!("{} '{}' already exists", kind, name),
            });
        }
        state.objects.insert(key, body.clone());
        Ok(body.clone())
    }

    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        body: &Value,
    ) -> Result<Value, ClusterError> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::Replace {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        state.check(name)?;
        let key = (kind, namespace.to_string(), name.to_string());
        match state.objects.get_mut(&key) {
            Some(existing) => {
                *existing = body.clone();
                Ok(body.clone())
            }
            None => Err(ClusterError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            }),
        }
    }
}
