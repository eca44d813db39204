//! Artifact transport (C2): pull/push the index.db OCI artifact, resolve
//! and copy digests (SPEC_FULL.md §4.2). Grounded in the pre-distillation
//! source's ORAS wrapper: pull creates a fresh subdirectory and cleans it up
//! on failure, push disables the local-path guard for absolute paths and
//! emits `--annotation key=value` pairs, and the ImageStream cache-sync
//! policy branches on a digest comparison before picking a pull source.
//!
//! The spec treats the exact `oras`/`skopeo` argv as out of core scope; this
//! module specifies the operations as an async trait so the build driver can
//! be exercised against a test double.

mod process;

pub use process::ProcessArtifactTransport;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to pull {reference}: {reason}")]
    PullFailed { reference: String, reason: String },

    #[error("failed to push {reference}: {reason}")]
    PushFailed { reference: String, reason: String },

    #[error("failed to resolve digest for {reference}: {reason}")]
    DigestFailed { reference: String, reason: String },

    #[error("failed to copy {src} to {dst}: {reason}")]
    CopyFailed {
        src: String,
        dst: String,
        reason: String,
    },
}

/// OCI artifact transport operations, mockable behind this trait.
#[async_trait]
pub trait ArtifactTransport: Send + Sync {
    /// Creates a fresh subdirectory under `base_dir`, downloads the
    /// artifact, and returns its absolute path. On failure the subdirectory
    /// is removed before the error is returned.
    async fn pull(
        &self,
        reference: &str,
        base_dir: &PathBuf,
        auth: Option<&str>,
    ) -> Result<PathBuf, TransportError>;

    /// `local_path` absolute disables the transport's path-validation
    /// guard, per the grounding source.
    async fn push(
        &self,
        reference: &str,
        local_path: &PathBuf,
        media_type: &str,
        annotations: &HashMap<String, String>,
        auth: Option<&str>,
    ) -> Result<(), TransportError>;

    async fn digest(&self, reference: &str) -> Result<String, TransportError>;

    /// Server-to-server copy; no local download.
    async fn copy(&self, src_ref_with_digest: &str, dst_ref: &str) -> Result<(), TransportError>;
}

/// `pullspec(from_index) -> artifact_ref`: `registry_template(tag =
/// image_name + "-" + tag_of(from_index))`.
pub fn index_db_pullspec(registry_template: &str, image_name: &str, from_index: &str) -> String {
    let tag_of_from_index = from_index.rsplit(':').next().unwrap_or(from_index);
    let tag = format!("{image_name}-{tag_of_from_index}");
    registry_template.replace("{tag}", &tag)
}

/// `push(ref, local_path, ...)`'s path-validation guard: disabled whenever
/// the local path is absolute.
pub fn path_validation_disabled(local_path: &PathBuf) -> bool {
    local_path.is_absolute()
}

/// Render annotations as `--annotation key=value` style pairs.
pub fn annotation_args(annotations: &HashMap<String, String>) -> Vec<String> {
    let mut keys: Vec<&String> = annotations.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|k| format!("{k}={}", annotations[k]))
        .collect()
}

/// Decision produced by the ImageStream cache-sync policy (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSyncDecision {
    PullFromImageStream,
    RefreshThenPullFromSource,
    PullFromSourceDirectly,
}

/// `source_digest`/`imagestream_digest` are `None` when the ImageStream
/// cache is disabled, in which case the decision is always a direct pull.
pub fn cache_sync_decision(
    imagestream_cache_enabled: bool,
    source_digest: &str,
    imagestream_digest: Option<&str>,
) -> CacheSyncDecision {
    if !imagestream_cache_enabled {
        return CacheSyncDecision::PullFromSourceDirectly;
    }
    match imagestream_digest {
        Some(d) if d == source_digest => CacheSyncDecision::PullFromImageStream,
        _ => CacheSyncDecision::RefreshThenPullFromSource,
    }
}

/// Generates the fresh subdirectory name `pull` stages an artifact into.
pub fn fresh_pull_subdir(base_dir: &PathBuf) -> PathBuf {
    base_dir.join(Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pullspec_derives_tag_from_image_name_and_from_index_tag() {
        let spec = index_db_pullspec(
            "registry.example.com/iib/index-db:{tag}",
            "index-image",
            "registry.example.com/ns/index:v4.19",
        );
        assert_eq!(spec, "registry.example.com/iib/index-db:index-image-v4.19");
    }

    #[test]
    fn test_path_validation_disabled_only_for_absolute_paths() {
        assert!(path_validation_disabled(&PathBuf::from("/tmp/index.db")));
        assert!(!path_validation_disabled(&PathBuf::from("index.db")));
    }

    #[test]
    fn test_annotation_args_sorted_key_value_pairs() {
        let mut annotations = HashMap::new();
        annotations.insert("b".to_string(), "2".to_string());
        annotations.insert("a".to_string(), "1".to_string());
        assert_eq!(annotation_args(&annotations), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_cache_sync_decision_matrix() {
        assert_eq!(
            cache_sync_decision(false, "sha256:AAA", Some("sha256:AAA")),
            CacheSyncDecision::PullFromSourceDirectly
        );
        assert_eq!(
            cache_sync_decision(true, "sha256:AAA", Some("sha256:AAA")),
            CacheSyncDecision::PullFromImageStream
        );
        assert_eq!(
            cache_sync_decision(true, "sha256:AAA", Some("sha256:BBB")),
            CacheSyncDecision::RefreshThenPullFromSource
        );
        assert_eq!(
            cache_sync_decision(true, "sha256:AAA", None),
            CacheSyncDecision::RefreshThenPullFromSource
        );
    }
}
