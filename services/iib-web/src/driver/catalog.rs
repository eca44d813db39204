//! Concrete `CatalogTool`: shells out to `opm`, following the same
//! process-driven pattern as `git::ProcessGitDriver` and
//! `transport::ProcessArtifactTransport`. SPEC_FULL.md §4.8 step 4 marks
//! the exact tool invocation out of core scope; this is the one real
//! implementation of the trait boundary it specifies instead.
//!
//! Bundle validation additionally consults the content-addressed inspect
//! cache (C1) before shelling out, since a bundle pullspec pinned to a
//! digest is exactly the "inspect image" call SPEC_FULL.md §4.1 describes.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::cache::InspectCache;
use crate::domain::{Request, RequestPayload};

use super::{CatalogMutation, CatalogTool, DriverError};

pub struct ProcessCatalogTool {
    opm_binary: String,
    cache: Arc<InspectCache>,
}

impl ProcessCatalogTool {
    pub fn new(cache: Arc<InspectCache>) -> Self {
        Self {
            opm_binary: "opm".to_string(),
            cache,
        }
    }

    async fn run(args: &[&str], binary: &str) -> Result<String, String> {
        let output = Command::new(binary).args(args).output().await.map_err(|e| e.to_string())?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn opm_version(&self) -> Result<String, DriverError> {
        Self::run(&["version"], &self.opm_binary)
            .await
            .map_err(|reason| DriverError::Other(format!("opm version failed: {reason}")))
    }
}

/// The subset of `opm render`'s OLM JSON output this tool reads: an
/// operator bundle's declared architecture support and replaces/skips
/// edges. Exact field coverage is intentionally partial — SPEC_FULL.md §4.8
/// step 4 leaves the full catalog schema to the operator tooling itself.
#[derive(Debug, Default, Deserialize)]
struct RenderedBundle {
    #[serde(default)]
    properties: Vec<RenderedProperty>,
    #[serde(default, rename = "relatedImages")]
    related_images: Vec<RenderedRelatedImage>,
}

#[derive(Debug, Deserialize)]
struct RenderedProperty {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RenderedRelatedImage {
    #[serde(default)]
    image: String,
}

#[async_trait]
impl CatalogTool for ProcessCatalogTool {
    async fn apply(
        &self,
        request: &Request,
        index_db_path: &PathBuf,
        configs_dir: &PathBuf,
    ) -> Result<CatalogMutation, DriverError> {
        let opm_version = self.opm_version().await?;

        let index_db_str = index_db_path.to_string_lossy().to_string();
        let configs_str = configs_dir.to_string_lossy().to_string();

        match &request.payload {
            RequestPayload::Add(payload) => {
                for bundle in &payload.bundles {
                    Self::run(
                        &["index", "add", "--database", &index_db_str, "--bundles", bundle, "--generate", "--out-dir", &configs_str],
                        &self.opm_binary,
                    )
                    .await
                    .map_err(|reason| DriverError::Other(format!("opm index add failed for {bundle}: {reason}")))?;
                }
            }
            RequestPayload::Rm(payload) => {
                for operator in &payload.operators {
                    Self::run(
                        &["index", "rm", "--database", &index_db_str, "--operators", operator],
                        &self.opm_binary,
                    )
                    .await
                    .map_err(|reason| DriverError::Other(format!("opm index rm failed for {operator}: {reason}")))?;
                }
            }
            RequestPayload::MergeIndexImage(payload) => {
                let source = payload.source_from_index.as_deref().unwrap_or_default();
                Self::run(
                    &["index", "merge", "--database", &index_db_str, "--from-index", source],
                    &self.opm_binary,
                )
                .await
                .map_err(|reason| DriverError::Other(format!("opm index merge failed: {reason}")))?;
            }
            RequestPayload::CreateEmptyIndex(_) => {
                Self::run(&["index", "prune", "--database", &index_db_str, "--packages", ""], &self.opm_binary)
                    .await
                    .map_err(|reason| DriverError::Other(format!("opm index prune failed: {reason}")))?;
            }
            RequestPayload::FbcOperations(payload) => {
                for fragment in &payload.fbc_fragments {
                    Self::run(
                        &["alpha", "render-template", "fbc", fragment, "--output-dir", &configs_str],
                        &self.opm_binary,
                    )
                    .await
                    .map_err(|reason| DriverError::Other(format!("opm fbc render failed for {fragment}: {reason}")))?;
                }
            }
            RequestPayload::AddDeprecations(payload) => {
                for schema in &payload.deprecation_schemas {
                    Self::run(
                        &["index", "deprecatetruncate", "--database", &index_db_str, "--bundle-images", schema],
                        &self.opm_binary,
                    )
                    .await
                    .map_err(|reason| DriverError::Other(format!("opm deprecation apply failed: {reason}")))?;
                }
            }
            RequestPayload::RegenerateBundle(_) | RequestPayload::RecursiveRelatedBundles(_) => {
                return Err(DriverError::Other(
                    "apply() is not used by the regenerate-bundle / recursive-related-bundles flows".to_string(),
                ));
            }
        }

        let architectures = request.architectures.clone();
        Ok(CatalogMutation { opm_version, architectures })
    }

    async fn validate_bundle(&self, pullspec: &str) -> Result<(), DriverError> {
        let pullspec_owned = pullspec.to_string();
        let opm_binary = self.opm_binary.clone();
        let result = self
            .cache
            .get_or_inspect("opm.alpha.bundle.validate", &[pullspec], move || {
                let pullspec = pullspec_owned.clone();
                let opm_binary = opm_binary.clone();
                async move {
                    match Self::run(&["alpha", "bundle", "validate", "--tag", &pullspec], &opm_binary).await {
                        Ok(stdout) => serde_json::json!({"ok": true, "output": stdout}),
                        Err(reason) => serde_json::json!({"ok": false, "reason": reason}),
                    }
                }
            })
            .await;

        if result["ok"].as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(DriverError::BundleValidation {
                bundle: pullspec.to_string(),
                reason: result["reason"].as_str().unwrap_or("validation failed").to_string(),
            })
        }
    }

    async fn related_bundles(&self, pullspec: &str) -> Result<Vec<String>, DriverError> {
        let rendered = Self::run(&["render", pullspec], &self.opm_binary)
            .await
            .map_err(|reason| DriverError::Other(format!("opm render failed for {pullspec}: {reason}")))?;

        let bundle: RenderedBundle = serde_json::from_str(&rendered).unwrap_or_default();

        let mut related: Vec<String> = bundle.related_images.into_iter().map(|r| r.image).filter(|i| !i.is_empty()).collect();

        for property in bundle.properties {
            if property.kind == "olm.substitutesFor" || property.kind == "olm.skips" || property.kind == "olm.replaces" {
                if let Some(image) = property.value.get("image").and_then(|v| v.as_str()) {
                    related.push(image.to_string());
                }
            }
        }

        related.sort();
        related.dedup();
        Ok(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_bundle_deserializes_related_images() {
        let json = r#"{"relatedImages": [{"image": "quay.io/ns/dep:1"}], "properties": []}"#;
        let bundle: RenderedBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.related_images.len(), 1);
        assert_eq!(bundle.related_images[0].image, "quay.io/ns/dep:1");
    }

    #[test]
    fn test_rendered_bundle_defaults_to_empty_on_unexpected_shape() {
        let bundle: RenderedBundle = serde_json::from_str("{}").unwrap();
        assert!(bundle.related_images.is_empty());
        assert!(bundle.properties.is_empty());
    }
}
