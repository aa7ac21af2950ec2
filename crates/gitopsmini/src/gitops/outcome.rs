//! Per-run results returned to on-demand callers.

use serde::Serialize;
use serde_json::Value;

use super::error::{ParseError, ReconcileError};
use super::manifest::ManifestDocument;
use super::reconciler::{Applied, ApplyAction};
use crate::registry::SyncStatus;

/// Detail of one document outcome: the applied object or the error, never both.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutcomeDetail {
    Applied { action: ApplyAction, object: Value },
    Failed { error: String },
}

/// Result of applying one manifest document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentOutcome {
    pub file: String,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub succeeded: bool,
    #[serde(flatten)]
    pub detail: OutcomeDetail,
}

impl DocumentOutcome {
    pub fn applied(doc: &ManifestDocument, applied: Applied) -> Self {
        Self {
            file: doc.file.clone(),
            kind: Some(doc.kind.clone()),
            name: Some(doc.name.clone()),
            succeeded: true,
            detail: OutcomeDetail::Applied {
                action: applied.action,
                object: applied.object,
            },
        }
    }

    pub fn rejected(doc: &ManifestDocument, error: &ReconcileError) -> Self {
        Self {
            file: doc.file.clone(),
            kind: Some(doc.kind.clone()),
            name: Some(doc.name.clone()),
            succeeded: false,
            detail: OutcomeDetail::Failed {
                error: error.to_string(),
            },
        }
    }

    pub fn unparsed(file: &str, error: &ParseError) -> Self {
        Self {
            file: file.to_string(),
            kind: None,
            name: None,
            succeeded: false,
            detail: OutcomeDetail::Failed {
                error: error.to_string(),
            },
        }
    }

    pub fn action(&self) -> Option<ApplyAction> {
        match &self.detail {
            OutcomeDetail::Applied { action, .. } => Some(*action),
            OutcomeDetail::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.detail {
            OutcomeDetail::Applied { .. } => None,
            OutcomeDetail::Failed { error } => Some(error),
        }
    }

    fn label(&self) -> String {
        match (&self.kind, &self.name) {
            (Some(kind), Some(name)) => format!("{} {}/{}", self.file, kind, name),
            _ => self.file.clone(),
        }
    }
}

/// Everything one sync run did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunResult {
    pub app_id: i64,
    pub run_id: String,
    /// Commit the manifests were read from, when known.
    pub revision: Option<String>,
    pub status: SyncStatus,
    pub duration_ms: u64,
    /// In source order: files by name, documents by position.
    pub outcomes: Vec<DocumentOutcome>,
    /// Deployments whose rollout was triggered.
    pub restarted: Vec<String>,
}

impl SyncRunResult {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded).count()
    }

    /// Derives the overall status from the outcomes.
    pub fn derive_status(outcomes: &[DocumentOutcome]) -> SyncStatus {
        if outcomes.iter().any(|o| !o.succeeded) {
            SyncStatus::Failed
        } else {
            SyncStatus::Success
        }
    }

    /// Error message persisted for a failed run; `None` when everything applied.
    pub fn failure_summary(&self) -> Option<String> {
        let failed: Vec<String> = self
            .outcomes
            .iter()
            .filter_map(|o| o.error().map(|e| format!("{}: {}", o.label(), e)))
            .collect();

        if failed.is_empty() {
            return None;
        }
        Some(format!(
            "{} of {} manifests failed: {}",
            failed.len(),
            self.outcomes.len(),
            failed.join("; ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitops::resource::ResourceKind;
    use serde_json::json;

    fn doc() -> ManifestDocument {
        ManifestDocument {
            file: "app.yaml".to_string(),
            index: 0,
            kind: "Deployment".to_string(),
            name: "web".to_string(),
            body: json!({}),
        }
    }

    fn result(outcomes: Vec<DocumentOutcome>) -> SyncRunResult {
        SyncRunResult {
            app_id: 1,
            run_id: "r".to_string(),
            revision: None,
            status: SyncRunResult::derive_status(&outcomes),
            duration_ms: 0,
            outcomes,
            restarted: Vec::new(),
        }
    }

    #[test]
    fn test_serializes_applied_without_error() {
        let outcome = DocumentOutcome::applied(
            &doc(),
            Applied {
                kind: ResourceKind::Deployment,
                action: ApplyAction::Created,
                object: json!({ "kind": "Deployment" }),
            },
        );
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["succeeded"], true);
        assert_eq!(value["action"], "created");
        assert_eq!(value["object"]["kind"], "Deployment");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_serializes_failure_without_object() {
        let outcome = DocumentOutcome::rejected(
            &doc(),
            &ReconcileError::Unsupported("ConfigMap".to_string()),
        );
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["succeeded"], false);
        assert_eq!(value["error"], "Unsupported resource kind: ConfigMap");
        assert!(value.get("object").is_none());
    }

    #[test]
    fn test_summary_and_status() {
        let ok = DocumentOutcome::applied(
            &doc(),
            Applied {
                kind: ResourceKind::Deployment,
                action: ApplyAction::Replaced,
                object: json!({}),
            },
        );
        let bad = DocumentOutcome::unparsed(
            "broken.yaml",
            &ParseError::NotAMapping {
                file: "broken.yaml".to_string(),
                index: 0,
            },
        );

        let all_ok = result(vec![ok.clone()]);
        assert_eq!(all_ok.status, SyncStatus::Success);
        assert!(all_ok.failure_summary().is_none());

        let mixed = result(vec![ok, bad]);
        assert_eq!(mixed.status, SyncStatus::Failed);
        assert_eq!(mixed.failed_count(), 1);
        let summary = mixed.failure_summary().unwrap();
        assert!(summary.starts_with("1 of 2 manifests failed: broken.yaml: "));
    }

    #[test]
    fn test_empty_run_is_success() {
        assert_eq!(SyncRunResult::derive_status(&[]), SyncStatus::Success);
    }
}
