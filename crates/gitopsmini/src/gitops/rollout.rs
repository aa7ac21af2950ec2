//! Rollout trigger: forces a Deployment to roll its pods.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::resource::{ResourceKind, RESTARTED_AT_ANNOTATION};
use crate::cluster::{ClusterApi, ClusterError};

/// Stamps the pod template's restart annotation with the current time and
/// replaces the Deployment, which makes the controller start a new rollout.
pub async fn restart_deployment(
    cluster: &dyn ClusterApi,
    name: &str,
    namespace: &str,
) -> Result<Value, ClusterError> {
    let mut deployment = cluster
        .read(ResourceKind::Deployment, namespace, name)
        .await?;

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    stamp_restarted_at(&mut deployment, &now)?;

    cluster
        .replace(ResourceKind::Deployment, namespace, name, &deployment)
        .await
}

/// Sets `spec.template.metadata.annotations[restartedAt] = at`, creating the
/// intermediate objects when absent.
fn stamp_restarted_at(deployment: &mut Value, at: &str) -> Result<(), ClusterError> {
    let mut node = deployment;
    for key in ["spec", "template", "metadata", "annotations"] {
        let map = node
            .as_object_mut()
            .ok_or_else(|| ClusterError::InvalidObject(format!("'{}' parent is not an object", key)))?;
        node = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
    }

    let annotations = node
        .as_object_mut()
        .ok_or_else(|| ClusterError::InvalidObject("annotations is not an object".to_string()))?;
    annotations.insert(
        RESTARTED_AT_ANNOTATION.to_string(),
        Value::String(at.to_string()),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::InMemoryCluster;
    use serde_json::json;

    #[test]
    fn test_stamp_creates_missing_path() {
        let mut deployment = json!({ "metadata": { "name": "web" } });
        stamp_restarted_at(&mut deployment, "2026-01-01T00:00:00.000Z").unwrap();
        assert_eq!(
            deployment["spec"]["template"]["metadata"]["annotations"][RESTARTED_AT_ANNOTATION],
            "2026-01-01T00:00:00.000Z"
        );
    }

    #[test]
    fn test_stamp_keeps_existing_annotations() {
        let mut deployment = json!({
            "spec": { "template": { "metadata": { "annotations": { "team": "web" } } } }
        });
        stamp_restarted_at(&mut deployment, "t").unwrap();
        let annotations = &deployment["spec"]["template"]["metadata"]["annotations"];
        assert_eq!(annotations["team"], "web");
        assert_eq!(annotations[RESTARTED_AT_ANNOTATION], "t");
    }

    #[test]
    fn test_stamp_rejects_non_object_spec() {
        let mut deployment = json!({ "spec": "oops" });
        assert!(matches!(
            stamp_restarted_at(&mut deployment, "t"),
            Err(ClusterError::InvalidObject(_))
        ));
    }

    #[tokio::test]
    async fn test_restart_replaces_with_annotation() {
        let cluster = InMemoryCluster::new();
        cluster.insert(
            ResourceKind::Deployment,
            "shop",
            "web",
            json!({ "kind": "Deployment", "metadata": { "name": "web" }, "spec": { "replicas": 1 } }),
        );

        restart_deployment(&cluster, "web", "shop").await.unwrap();

        let stored = cluster
            .object(ResourceKind::Deployment, "shop", "web")
            .unwrap();
        let stamp = stored["spec"]["template"]["metadata"]["annotations"][RESTARTED_AT_ANNOTATION]
            .as_str()
            .unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
        assert_eq!(stored["spec"]["replicas"], 1);
        assert_eq!(cluster.replace_count(ResourceKind::Deployment, "shop", "web"), 1);
    }

    #[tokio::test]
    async fn test_restart_missing_deployment() {
        let cluster = InMemoryCluster::new();
        let err = restart_deployment(&cluster, "web", "shop").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
