//! Pipeline client (C4): find/poll/extract a remote build pipeline run
//! keyed by commit SHA (SPEC_FULL.md §4.4). Grounded precisely in the
//! pre-distillation source's Kubernetes-style custom-resource client: a
//! lazily cached singleton, CA-cert-as-path-or-inline-PEM, empty-list retry
//! on `find_pipelinerun`, a 30s poll interval, and the exact status-condition
//! taxonomy.

pub mod k8s;

pub use k8s::K8sPipelineClient;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no pipeline run found for commit {commit_sha} after {attempts} attempts")]
    NotFound { commit_sha: String, attempts: u32 },

    #[error("pipeline run {name} was cancelled")]
    Cancelled { name: String },

    #[error("pipeline run {name} failed: {reason}")]
    Failed { name: String, reason: String },

    #[error("timed out waiting for pipeline run {name} to complete")]
    Timeout { name: String },

    #[error("pipeline run {name} has no IMAGE_URL result")]
    MissingImageUrl { name: String },

    #[error("failed to write CA certificate to a temp file: {0}")]
    CaCertWrite(String),
}

/// One `status.conditions[]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineRunCondition {
    pub reason: String,
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// One `status.results[]` / `status.pipelineResults[]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineRunResult {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineRunStatus {
    #[serde(default)]
    pub conditions: Vec<PipelineRunCondition>,
    #[serde(default)]
    pub results: Vec<PipelineRunResult>,
    #[serde(default, rename = "pipelineResults")]
    pub pipeline_results: Vec<PipelineRunResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineRun {
    pub name: String,
    #[serde(default)]
    pub status: PipelineRunStatus,
}

/// The decision `wait_for_pipeline_completion`'s polling loop makes after
/// each fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Succeeded,
    Cancelled,
    Failed(String),
    StillRunning,
}

/// Classify the first condition, per the exact taxonomy in SPEC_FULL.md
/// §4.4: success/cancelled/explicit-failure/implicit-failure/still-running.
pub fn classify_status(status: &PipelineRunStatus) -> PipelineOutcome {
    let Some(condition) = status.conditions.first() else {
        return PipelineOutcome::StillRunning;
    };

    match condition.reason.as_str() {
        "Succeeded" | "Completed" => PipelineOutcome::Succeeded,
        "Cancelled" => PipelineOutcome::Cancelled,
        "Failed" | "PipelineRunTimeout" | "CreateRunFailed" => {
            PipelineOutcome::Failed(condition.reason.clone())
        }
        _ if condition.status == "False" => PipelineOutcome::Failed(condition.message.clone()),
        _ => PipelineOutcome::StillRunning,
    }
}

/// Read `status.results[]` (preferred) or `status.pipelineResults[]`
/// (fallback) for the entry named `IMAGE_URL`, trimmed.
pub fn extract_image_url(status: &PipelineRunStatus) -> Option<String> {
    status
        .results
        .iter()
        .chain(status.pipeline_results.iter())
        .find(|r| r.name == "IMAGE_URL")
        .map(|r| r.value.trim().to_string())
}

pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// CA certificate source: a filesystem path, or inline PEM content that
/// must be written to a temp file on first use.
///
/// TODO: the temp file created for `Inline` is never cleaned up; the
/// grounding source has the same gap.
#[derive(Debug, Clone)]
pub enum CaCertSource {
    Path(PathBuf),
    Inline(String),
}

#[derive(Debug, Clone)]
pub struct PipelineClientConfig {
    pub cluster_url: String,
    pub cluster_token: String,
    pub ca_cert: CaCertSource,
    pub namespace: String,
    pub pipeline_timeout: Duration,
    pub total_attempts: u32,
    pub retry_multiplier: f64,
}

#[async_trait]
pub trait PipelineClient: Send + Sync {
    /// List namespaced pipeline runs labeled with `commit_sha`. Retries with
    /// exponential backoff when the result is empty (pipeline creation is
    /// async relative to `git push`).
    async fn find_pipelinerun(&self, commit_sha: &str) -> Result<Vec<PipelineRun>, PipelineError>;

    async fn wait_for_pipeline_completion(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<PipelineRun, PipelineError>;

    fn get_pipelinerun_image_url(&self, run: &PipelineRun) -> Result<String, PipelineError> {
        extract_image_url(&run.status).ok_or_else(|| PipelineError::MissingImageUrl {
            name: run.name.clone(),
        })
    }
}

/// Resolve a `CaCertSource` to a filesystem path usable by the HTTP/TLS
/// client, writing inline PEM content to a temp file on first use.
pub fn resolve_ca_cert_path(source: &CaCertSource) -> Result<PathBuf, PipelineError> {
    match source {
        CaCertSource::Path(p) => Ok(p.clone()),
        CaCertSource::Inline(pem) => {
            let path = std::env::temp_dir().join(format!(
                "iib-pipeline-ca-{}.pem",
                uuid::Uuid::new_v4()
            ));
            std::fs::write(&path, pem).map_err(|e| PipelineError::CaCertWrite(e.to_string()))?;
            Ok(path)
        }
    }
}

/// Exponential backoff delay for attempt `n` (0-indexed) of
/// `find_pipelinerun`'s empty-list retry.
pub fn backoff_delay(base: Duration, multiplier: f64, attempt: u32) -> Duration {
    base.mul_f64(multiplier.powi(attempt as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_with(reason: &str, status: &str) -> PipelineRunStatus {
        PipelineRunStatus {
            conditions: vec![PipelineRunCondition {
                reason: reason.to_string(),
                status: status.to_string(),
                message: format!("{reason} happened"),
            }],
            results: vec![],
            pipeline_results: vec![],
        }
    }

    #[test]
    fn test_classify_status_success_reasons() {
        assert_eq!(classify_status(&status_with("Succeeded", "True")), PipelineOutcome::Succeeded);
        assert_eq!(classify_status(&status_with("Completed", "True")), PipelineOutcome::Succeeded);
    }

    #[test]
    fn test_classify_status_cancelled() {
        assert_eq!(classify_status(&status_with("Cancelled", "False")), PipelineOutcome::Cancelled);
    }

    #[test]
    fn test_classify_status_explicit_failures() {
        for reason in ["Failed", "PipelineRunTimeout", "CreateRunFailed"] {
            assert!(matches!(
                classify_status(&status_with(reason, "False")),
                PipelineOutcome::Failed(_)
            ));
        }
    }

    #[test]
    fn test_classify_status_implicit_failure_on_status_false() {
        assert!(matches!(
            classify_status(&status_with("SomeOtherReason", "False")),
            PipelineOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_classify_status_empty_conditions_still_running() {
        let status = PipelineRunStatus::default();
        assert_eq!(classify_status(&status), PipelineOutcome::StillRunning);
    }

    #[test]
    fn test_extract_image_url_prefers_results_over_pipeline_results() {
        let status = PipelineRunStatus {
            conditions: vec![],
            results: vec![PipelineRunResult {
                name: "IMAGE_URL".to_string(),
                value: "  registry.example.com/iib/image@sha256:AAA  ".to_string(),
            }],
            pipeline_results: vec![],
        };
        assert_eq!(
            extract_image_url(&status).unwrap(),
            "registry.example.com/iib/image@sha256:AAA"
        );
    }

    #[test]
    fn test_extract_image_url_falls_back_to_pipeline_results() {
        let status = PipelineRunStatus {
            conditions: vec![],
            results: vec![],
            pipeline_results: vec![PipelineRunResult {
                name: "IMAGE_URL".to_string(),
                value: "registry.example.com/iib/image@sha256:BBB".to_string(),
            }],
        };
        assert_eq!(
            extract_image_url(&status).unwrap(),
            "registry.example.com/iib/image@sha256:BBB"
        );
    }

    #[test]
    fn test_backoff_delay_grows_with_attempt() {
        let base = Duration::from_secs(1);
        assert!(backoff_delay(base, 2.0, 2) > backoff_delay(base, 2.0, 0));
    }
}
