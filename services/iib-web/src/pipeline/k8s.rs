//! Concrete `PipelineClient`: a Kubernetes custom-resource API client over
//! `reqwest`, grounded precisely in the pre-distillation source's
//! lazily-cached-singleton Kubernetes client (same CA-cert-as-path-or-inline
//! handling, same empty-list retry on `find_pipelinerun`). `reqwest` is
//! already the teacher's workspace HTTP client crate, used here exactly as
//! it is for the git-host API client in `git::process` would be if that
//! trait reached for a real host's REST API instead of shelling to `git`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{backoff_delay, classify_status, resolve_ca_cert_path, PipelineClient, PipelineClientConfig, PipelineError, PipelineOutcome, PipelineRun, POLL_INTERVAL};

#[derive(Debug, Deserialize)]
struct PipelineRunList {
    items: Vec<PipelineRun>,
}

pub struct K8sPipelineClient {
    client: Client,
    config: PipelineClientConfig,
}

impl K8sPipelineClient {
    pub fn new(config: PipelineClientConfig) -> Result<Self, PipelineError> {
        let ca_cert_path = resolve_ca_cert_path(&config.ca_cert)?;
        let ca_cert_pem = std::fs::read(&ca_cert_path).map_err(|e| PipelineError::CaCertWrite(e.to_string()))?;
        let ca_cert = reqwest::Certificate::from_pem(&ca_cert_pem)
            .map_err(|e| PipelineError::CaCertWrite(e.to_string()))?;

        let client = Client::builder()
            .add_root_certificate(ca_cert)
            .build()
            .map_err(|e| PipelineError::CaCertWrite(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn pipelineruns_url(&self) -> String {
        format!(
            "{}/apis/tekton.dev/v1/namespaces/{}/pipelineruns",
            self.config.cluster_url.trim_end_matches('/'),
            self.config.namespace
        )
    }
}

#[async_trait]
impl PipelineClient for K8sPipelineClient {
    async fn find_pipelinerun(&self, commit_sha: &str) -> Result<Vec<PipelineRun>, PipelineError> {
        let mut last_empty_attempt = 0u32;

        for attempt in 0..self.config.total_attempts {
            let response = self
                .client
                .get(self.pipelineruns_url())
                .bearer_auth(&self.config.cluster_token)
                .query(&[("labelSelector", format!("commit-sha={commit_sha}"))])
                .send()
                .await
                .map_err(|e| PipelineError::NotFound {
                    commit_sha: commit_sha.to_string(),
                    attempts: attempt + 1,
                })?;

            if let Ok(list) = response.json::<PipelineRunList>().await {
                if !list.items.is_empty() {
                    return Ok(list.items);
                }
            }

            last_empty_attempt = attempt;
            tokio::time::sleep(backoff_delay(Duration::from_secs(1), self.config.retry_multiplier, attempt)).await;
        }

        Err(PipelineError::NotFound {
            commit_sha: commit_sha.to_string(),
            attempts: last_empty_attempt + 1,
        })
    }

    async fn wait_for_pipeline_completion(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<PipelineRun, PipelineError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let url = format!("{}/{}", self.pipelineruns_url(), name);
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.config.cluster_token)
                .send()
                .await
                .map_err(|e| PipelineError::Failed {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;

            let run: PipelineRun = response.json().await.map_err(|e| PipelineError::Failed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

            match classify_status(&run.status) {
                PipelineOutcome::Succeeded => return Ok(run),
                PipelineOutcome::Cancelled => {
                    return Err(PipelineError::Cancelled { name: name.to_string() })
                }
                PipelineOutcome::Failed(reason) => {
                    return Err(PipelineError::Failed {
                        name: name.to_string(),
                        reason,
                    })
                }
                PipelineOutcome::StillRunning => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(PipelineError::Timeout { name: name.to_string() });
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }
}
