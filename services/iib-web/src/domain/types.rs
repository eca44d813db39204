//! Per-request-type payload shapes (SPEC_FULL.md §3 "Per-type extensions").
//!
//! Each of these is the side-table content joined to a `Request` row by
//! shared id. `RequestType` and `BuildState` themselves live in `iib-events`
//! since the messaging layer needs them too; everything else that is purely
//! persistence/validation shaped lives here.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `distribution_scope` — shared across several request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionScope {
    Prod,
    Stage,
    Dev,
}

impl DistributionScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "prod" => Some(Self::Prod),
            "stage" => Some(Self::Stage),
            "dev" => Some(Self::Dev),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prod => "prod",
            Self::Stage => "stage",
            Self::Dev => "dev",
        }
    }
}

/// `graph_update_mode` — default allow-list is `{replaces, semver,
/// semver-skippatch}` per SPEC_FULL.md §6; a deployment may narrow it via
/// `IIB_GRAPH_MODE_OPTIONS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GraphUpdateMode {
    Replaces,
    Semver,
    SemverSkippatch,
}

impl GraphUpdateMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "replaces" => Some(Self::Replaces),
            "semver" => Some(Self::Semver),
            "semver-skippatch" => Some(Self::SemverSkippatch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replaces => "replaces",
            Self::Semver => "semver",
            Self::SemverSkippatch => "semver-skippatch",
        }
    }
}

/// Side-table payload for an `add` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddPayload {
    pub from_index: Option<String>,
    pub from_index_resolved: Option<String>,
    pub bundles: Vec<String>,
    pub bundle_mapping: HashMap<String, Vec<String>>,
    pub organization: Option<String>,
    pub distribution_scope: Option<DistributionScope>,
    pub omps_operator_version: HashMap<String, String>,
    pub deprecation_bundles: Vec<String>,
    pub force_backport: bool,
    /// Never emitted on the wire; scrubbed at the API serialization boundary
    /// (`SECRET_FIELDS`), not at storage time, since the build driver needs
    /// the real value.
    pub cnr_token: Option<String>,
    pub graph_update_mode: Option<GraphUpdateMode>,
    pub check_related_images: bool,
    /// Serial-queue requirement (SPEC_FULL.md §4.7/§5): replace the input
    /// `from_index` tag with this build's output rather than a throw-away
    /// merge-request build.
    pub overwrite_from_index: bool,
    pub overwrite_from_index_token: Option<String>,
}

/// Side-table payload for an `rm` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RmPayload {
    pub from_index: Option<String>,
    pub from_index_resolved: Option<String>,
    pub operators: Vec<String>,
    pub distribution_scope: Option<DistributionScope>,
    pub overwrite_from_index: bool,
    pub overwrite_from_index_token: Option<String>,
}

/// Side-table payload for a `regenerate-bundle` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegenerateBundlePayload {
    pub from_bundle_image: Option<String>,
    pub from_bundle_image_resolved: Option<String>,
    pub bundle_image: Option<String>,
    pub bundle_replacements: HashMap<String, String>,
    pub organization: Option<String>,
    pub related_bundles_url: Option<String>,
}

/// Side-table payload for a `merge-index-image` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeIndexImagePayload {
    pub source_from_index: Option<String>,
    pub source_from_index_resolved: Option<String>,
    pub target_index: Option<String>,
    pub target_index_resolved: Option<String>,
    pub deprecation_list: Vec<String>,
    pub ignore_bundle_ocp_version: bool,
    pub distribution_scope: Option<DistributionScope>,
    pub overwrite_target_index: bool,
    pub overwrite_target_index_token: Option<String>,
}

/// Side-table payload for a `create-empty-index` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateEmptyIndexPayload {
    pub from_index: Option<String>,
    pub from_index_resolved: Option<String>,
    pub labels: HashMap<String, String>,
    pub output_fbc: bool,
}

/// Side-table payload for an `fbc-operations` request.
///
/// `fbc_fragments`/`fbc_fragments_resolved` are surfaced here for the wire
/// response, but are backed at rest by the `request_fbc_fragment` join
/// table (not serialized into this row's JSONB payload) — see
/// `db::request_store::RequestStore::fbc_fragments` and DESIGN.md's "FBC
/// fragment schema ambiguity" entry for the second, direct-FK access path
/// kept in sync alongside it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FbcOperationsPayload {
    pub from_index: Option<String>,
    pub from_index_resolved: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fbc_fragments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fbc_fragments_resolved: Vec<String>,
    pub used_fbc_fragment: bool,
    pub distribution_scope: Option<DistributionScope>,
}

/// Side-table payload for an `add-deprecations` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddDeprecationsPayload {
    pub from_index: Option<String>,
    pub from_index_resolved: Option<String>,
    pub operators: Vec<String>,
    pub deprecation_schemas: Vec<String>,
}

/// Side-table payload for a `recursive-related-bundles` request
/// (supplemented type, SPEC_FULL.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecursiveRelatedBundlesPayload {
    pub parent_bundle_image: Option<String>,
    pub parent_bundle_image_resolved: Option<String>,
    pub organization: Option<String>,
}

/// The tagged union of every request type's side-table content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "request_type", rename_all = "kebab-case")]
pub enum RequestPayload {
    Add(AddPayload),
    Rm(RmPayload),
    RegenerateBundle(RegenerateBundlePayload),
    MergeIndexImage(MergeIndexImagePayload),
    CreateEmptyIndex(CreateEmptyIndexPayload),
    FbcOperations(FbcOperationsPayload),
    AddDeprecations(AddDeprecationsPayload),
    RecursiveRelatedBundles(RecursiveRelatedBundlesPayload),
}

impl RequestPayload {
    pub fn request_type(&self) -> iib_events::RequestType {
        use iib_events::RequestType as T;
        match self {
            Self::Add(_) => T::Add,
            Self::Rm(_) => T::Rm,
            Self::RegenerateBundle(_) => T::RegenerateBundle,
            Self::MergeIndexImage(_) => T::MergeIndexImage,
            Self::CreateEmptyIndex(_) => T::CreateEmptyIndex,
            Self::FbcOperations(_) => T::FbcOperations,
            Self::AddDeprecations(_) => T::AddDeprecations,
            Self::RecursiveRelatedBundles(_) => T::RecursiveRelatedBundles,
        }
    }

    /// The catalog pullspec the build driver clones/mutates for this
    /// request, `None` for the two types that never touch a Git-managed
    /// catalog (`regenerate-bundle`, `recursive-related-bundles`).
    pub fn git_subject(&self) -> Option<&str> {
        match self {
            Self::Add(p) => p.from_index.as_deref(),
            Self::Rm(p) => p.from_index.as_deref(),
            Self::MergeIndexImage(p) => p.target_index.as_deref(),
            Self::CreateEmptyIndex(p) => p.from_index.as_deref(),
            Self::FbcOperations(p) => p.from_index.as_deref(),
            Self::AddDeprecations(p) => p.from_index.as_deref(),
            Self::RegenerateBundle(_) | Self::RecursiveRelatedBundles(_) => None,
        }
    }

    /// Whether this request replaces its subject tag in place (serial-queue
    /// requirement) rather than producing a throw-away merge-request build.
    pub fn overwrite_from_index(&self) -> bool {
        match self {
            Self::Add(p) => p.overwrite_from_index,
            Self::Rm(p) => p.overwrite_from_index,
            Self::MergeIndexImage(p) => p.overwrite_target_index,
            _ => false,
        }
    }

    pub fn overwrite_token(&self) -> Option<&str> {
        match self {
            Self::Add(p) => p.overwrite_from_index_token.as_deref(),
            Self::Rm(p) => p.overwrite_from_index_token.as_deref(),
            Self::MergeIndexImage(p) => p.overwrite_target_index_token.as_deref(),
            _ => None,
        }
    }
}

/// Fields secret enough that `to_json` must never emit them
/// (SPEC_FULL.md §8 "secret set").
pub const SECRET_FIELDS: &[&str] = &[
    "cnr_token",
    "overwrite_from_index_token",
    "overwrite_target_index_token",
    "registry_auths",
];

/// Strip every key in `SECRET_FIELDS` from a JSON object, recursively.
/// Applied once, at the API serialization boundary, to the merged
/// common-envelope-plus-payload object before it goes on the wire.
pub fn scrub_secrets(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for field in SECRET_FIELDS {
                map.remove(*field);
            }
            for v in map.values_mut() {
                scrub_secrets(v);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items {
                scrub_secrets(v);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_scope_roundtrip() {
        for s in ["prod", "stage", "dev"] {
            assert_eq!(DistributionScope::parse(s).unwrap().as_str(), s);
        }
        assert!(DistributionScope::parse("bogus").is_none());
    }

    #[test]
    fn test_graph_update_mode_default_allow_list() {
        assert!(GraphUpdateMode::parse("replaces").is_some());
        assert!(GraphUpdateMode::parse("semver-skippatch").is_some());
        assert!(GraphUpdateMode::parse("unknown-mode").is_none());
    }

    #[test]
    fn test_request_payload_tags_match_request_type() {
        let p = RequestPayload::Add(AddPayload::default());
        assert_eq!(p.request_type(), iib_events::RequestType::Add);
    }

    #[test]
    fn test_scrub_secrets_removes_every_secret_field() {
        let mut value = serde_json::json!({
            "id": 1,
            "cnr_token": "s3cr3t",
            "overwrite_from_index_token": "s3cr3t",
            "overwrite_target_index_token": "s3cr3t",
            "registry_auths": {"auths": {}},
            "bundles": ["quay.io/ns/b:1"],
        });
        scrub_secrets(&mut value);
        let obj = value.as_object().unwrap();
        for field in SECRET_FIELDS {
            assert!(!obj.contains_key(*field), "{field} was not scrubbed");
        }
        assert!(obj.contains_key("bundles"));
    }
}
