//! Concrete `ArtifactTransport`: shells out to `oras` (OCI artifact
//! pull/push) and `skopeo` (digest inspection, registry-to-registry copy),
//! following the same process-driven pattern as `git::ProcessGitDriver` and
//! the teacher's device/image helpers. SPEC_FULL.md §4.2 marks the exact
//! `oras`/`skopeo` argv out of core scope; this is the one real
//! implementation of the trait it specifies instead.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use super::{annotation_args, fresh_pull_subdir, path_validation_disabled, ArtifactTransport, TransportError};

pub struct ProcessArtifactTransport {
    oras_binary: String,
    skopeo_binary: String,
}

impl ProcessArtifactTransport {
    pub fn new() -> Self {
        Self {
            oras_binary: "oras".to_string(),
            skopeo_binary: "skopeo".to_string(),
        }
    }

    async fn run(binary: &str, args: &[&str]) -> Result<String, String> {
        let output = Command::new(binary)
            .args(args)
            .output()
            .await
            .map_err(|e| e.to_string())?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for ProcessArtifactTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactTransport for ProcessArtifactTransport {
    async fn pull(
        &self,
        reference: &str,
        base_dir: &PathBuf,
        auth: Option<&str>,
    ) -> Result<PathBuf, TransportError> {
        let dest = fresh_pull_subdir(base_dir);
        if let Err(e) = tokio::fs::create_dir_all(&dest).await {
            return Err(TransportError::PullFailed {
                reference: reference.to_string(),
                reason: e.to_string(),
            });
        }

        let mut args = vec!["pull".to_string(), reference.to_string(), "--output".to_string(), dest.to_string_lossy().to_string()];
        if let Some(auth) = auth {
            args.push("--username".to_string());
            args.push(auth.to_string());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        match Self::run(&self.oras_binary, &arg_refs).await {
            Ok(_) => Ok(dest),
            Err(reason) => {
                let _ = tokio::fs::remove_dir_all(&dest).await;
                Err(TransportError::PullFailed {
                    reference: reference.to_string(),
                    reason,
                })
            }
        }
    }

    async fn push(
        &self,
        reference: &str,
        local_path: &PathBuf,
        media_type: &str,
        annotations: &HashMap<String, String>,
        auth: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut args = vec!["push".to_string(), reference.to_string()];
        args.push(format!("{}:{}", local_path.to_string_lossy(), media_type));
        if path_validation_disabled(local_path) {
            args.push("--disable-path-validation".to_string());
        }
        for annotation in annotation_args(annotations) {
            args.push("--annotation".to_string());
            args.push(annotation);
        }
        if let Some(auth) = auth {
            args.push("--username".to_string());
            args.push(auth.to_string());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        Self::run(&self.oras_binary, &arg_refs)
            .await
            .map(|_| ())
            .map_err(|reason| TransportError::PushFailed {
                reference: reference.to_string(),
                reason,
            })
    }

    async fn digest(&self, reference: &str) -> Result<String, TransportError> {
        Self::run(&self.skopeo_binary, &["inspect", "--format", "{{.Digest}}", &format!("docker://{reference}")])
            .await
            .map_err(|reason| TransportError::DigestFailed {
                reference: reference.to_string(),
                reason,
            })
    }

    async fn copy(&self, src_ref_with_digest: &str, dst_ref: &str) -> Result<(), TransportError> {
        Self::run(
            &self.skopeo_binary,
            &[
                "copy",
                &format!("docker://{src_ref_with_digest}"),
                &format!("docker://{dst_ref}"),
            ],
        )
        .await
        .map(|_| ())
        .map_err(|reason| TransportError::CopyFailed {
            src: src_ref_with_digest.to_string(),
            dst: dst_ref.to_string(),
            reason,
        })
    }
}
