//! Builders for manifests and applications.

#![allow(dead_code)]

use gitopsmini::NewApplication;

pub fn deployment_yaml(name: &str, replicas: u32) -> String {
    format!(
        r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {name}
spec:
  replicas: {replicas}
  selector:
    matchLabels:
      app: {name}
  template:
    metadata:
      labels:
        app: {name}
    spec:
      containers:
        - name: {name}
          image: nginx:1.27
"#
    )
}

pub fn service_yaml(name: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Service
metadata:
  name: {name}
spec:
  selector:
    app: {name}
  ports:
    - port: 80
"#
    )
}

pub fn ingress_yaml(name: &str, host: &str) -> String {
    format!(
        r#"apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  name: {name}
spec:
  rules:
    - host: {host}
"#
    )
}

pub fn config_map_yaml(name: &str) -> String {
    format!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {name}\ndata:\n  key: value\n")
}

/// Joins documents into one multi-document file.
pub fn multi_doc(docs: &[String]) -> String {
    docs.join("---\n")
}

/// Builder for `NewApplication`.
pub struct AppBuilder {
    app: NewApplication,
}

impl AppBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            app: NewApplication::new(name, format!("https://git.example.com/{}.git", name)),
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.app.namespace = namespace.to_string();
        self
    }

    pub fn branch(mut self, branch: &str) -> Self {
        self.app.branch_name = branch.to_string();
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.app.repo_path = path.to_string();
        self
    }

    pub fn repo_url(mut self, url: &str) -> Self {
        self.app.repo_url = url.to_string();
        self
    }

    pub fn auto_sync(mut self, enabled: bool) -> Self {
        self.app.auto_sync = enabled;
        self
    }

    pub fn build(self) -> NewApplication {
        self.app
    }
}
