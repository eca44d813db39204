//! Shared vocabulary for the notification bus: the request/batch lifecycle
//! states and the per-batch summary body, reused by the HTTP layer (which
//! persists the same states) and the messaging sender (which reports them).

use iib_id::{BatchId, RequestId};
use serde::{Deserialize, Serialize};

/// A request's lifecycle state. Mirrors the three-value `RequestState.state`
/// column; kept here too since the messaging layer reports it independent of
/// any particular persistence representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    InProgress,
    Complete,
    Failed,
}

impl BuildState {
    /// All valid state names, used to render the sorted listing in the
    /// "unknown state" validation error.
    pub const ALL: [BuildState; 3] = [
        BuildState::Complete,
        BuildState::Failed,
        BuildState::InProgress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildState::InProgress => "in_progress",
            BuildState::Complete => "complete",
            BuildState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(BuildState::InProgress),
            "complete" => Some(BuildState::Complete),
            "failed" => Some(BuildState::Failed),
            _ => None,
        }
    }

    /// A state is terminal when no further transition to a *different* kind
    /// is allowed (same-state reason updates remain legal either way).
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Complete | BuildState::Failed)
    }
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The request type discriminator. Shared between the persistence layer
/// (drives which side table is joined) and the messaging layer (reported in
/// the per-batch summary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestType {
    Add,
    Rm,
    RegenerateBundle,
    MergeIndexImage,
    CreateEmptyIndex,
    FbcOperations,
    AddDeprecations,
    RecursiveRelatedBundles,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Add => "add",
            RequestType::Rm => "rm",
            RequestType::RegenerateBundle => "regenerate-bundle",
            RequestType::MergeIndexImage => "merge-index-image",
            RequestType::CreateEmptyIndex => "create-empty-index",
            RequestType::FbcOperations => "fbc-operations",
            RequestType::AddDeprecations => "add-deprecations",
            RequestType::RecursiveRelatedBundles => "recursive-related-bundles",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(RequestType::Add),
            "rm" => Some(RequestType::Rm),
            "regenerate-bundle" => Some(RequestType::RegenerateBundle),
            "merge-index-image" => Some(RequestType::MergeIndexImage),
            "create-empty-index" => Some(RequestType::CreateEmptyIndex),
            "fbc-operations" => Some(RequestType::FbcOperations),
            "add-deprecations" => Some(RequestType::AddDeprecations),
            "recursive-related-bundles" => Some(RequestType::RecursiveRelatedBundles),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One request's entry inside a batch-state-change body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequestSummary {
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    pub request_type: RequestType,
}

/// The body of a per-batch notification.
///
/// Emitted only when the batch is newly created, or when it has just
/// reached a terminal aggregate state (no request left in-progress) -
/// never on an ordinary in-progress-to-in-progress phase update of one of
/// its member requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStateBody {
    pub batch: BatchId,
    pub annotations: serde_json::Value,
    pub requests: Vec<BatchRequestSummary>,
    /// Sorted for a stable wire representation.
    pub request_ids: Vec<RequestId>,
    pub state: BuildState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_state_roundtrip() {
        for state in BuildState::ALL {
            let s = state.as_str();
            assert_eq!(BuildState::parse(s), Some(state));
        }
    }

    #[test]
    fn test_build_state_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&BuildState::InProgress).unwrap(),
            "\"in_progress\""
        );
    }

    #[test]
    fn test_request_type_serde_kebab_case() {
        assert_eq!(
            serde_json::to_string(&RequestType::RegenerateBundle).unwrap(),
            "\"regenerate-bundle\""
        );
        assert_eq!(
            RequestType::parse("fbc-operations"),
            Some(RequestType::FbcOperations)
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(BuildState::Complete.is_terminal());
        assert!(BuildState::Failed.is_terminal());
        assert!(!BuildState::InProgress.is_terminal());
    }

    #[test]
    fn test_batch_state_body_serialization_omits_absent_user() {
        let body = BatchStateBody {
            batch: BatchId::new(1),
            annotations: serde_json::json!({}),
            requests: vec![],
            request_ids: vec![],
            state: BuildState::Complete,
            user: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("user").is_none());
    }
}
