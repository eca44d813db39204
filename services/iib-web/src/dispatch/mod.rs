//! Dispatcher (C7, SPEC_FULL.md §4.7): per-endpoint schema/cross-field
//! validation plus queue classification and enqueueing. The HTTP handlers
//! in `api::v1::builds` call into this module after constructing and
//! persisting a request; this module owns none of the persistence itself.

use std::collections::HashSet;

use iib_id::RequestId;
use serde_json::Value;

use crate::api::error::ApiError;
use crate::config::Config;
use crate::domain::DomainError;
use crate::state::AppState;
use crate::worker::WorkItem;

/// Reject any key in `raw` that is not in `allowed` (SPEC_FULL.md §4.7 step
/// 1 "Unknown parameters are rejected with a listing").
pub fn validate_allowed_keys(raw: &Value, allowed: &[&str]) -> Result<(), DomainError> {
    let Some(obj) = raw.as_object() else {
        return Ok(());
    };
    let allowed: HashSet<&str> = allowed.iter().copied().collect();
    let unrecognized: Vec<String> = obj.keys().filter(|k| !allowed.contains(k.as_str())).cloned().collect();
    if unrecognized.is_empty() {
        Ok(())
    } else {
        Err(DomainError::UnrecognizedParameters(unrecognized.join(", ")))
    }
}

/// `overwrite_from_index_token` requires `overwrite_from_index`
/// (SPEC_FULL.md §4.7 step 2 / §8 property).
pub fn validate_overwrite_token(overwrite: bool, token: Option<&str>) -> Result<(), DomainError> {
    if token.is_some() && !overwrite {
        return Err(DomainError::TokenWithoutOverwrite);
    }
    Ok(())
}

/// `overwrite_from_index=true` without a token requires a privileged caller
/// (SPEC_FULL.md §4.7 step 2 / §8 property).
pub fn validate_overwrite_privilege(
    config: &Config,
    overwrite: bool,
    token: Option<&str>,
    user: &str,
) -> Result<(), DomainError> {
    if overwrite && token.is_none() && !crate::api::authz::is_privileged(config, user) {
        return Err(DomainError::OverwriteRequiresPrivilege);
    }
    Ok(())
}

/// `from_index`/`binary_image` are required only when `bundles` is absent
/// (SPEC_FULL.md §4.7 step 2, `/builds/add`).
pub fn validate_add_subject(
    bundles_present: bool,
    from_index: Option<&str>,
    binary_image: Option<&str>,
) -> Result<(), DomainError> {
    if !bundles_present && (from_index.is_none() || binary_image.is_none()) {
        return Err(DomainError::Validation(
            "from_index and binary_image are required when bundles is absent".to_string(),
        ));
    }
    Ok(())
}

/// Classify the worker queue for `user` per SPEC_FULL.md §4.7 step 4, then
/// enqueue the dispatched request onto it. Returns the queue name chosen.
///
/// On scheduling failure (queue backend unreachable) the caller must
/// transition the request to `failed` and respond 500 (`fail_scheduling`).
pub async fn classify_and_enqueue(
    state: &AppState,
    user: &str,
    overwrite_from_index: bool,
    request_id: RequestId,
) -> Result<String, crate::worker::SchedulingError> {
    let config = state.config();
    let queue = config
        .user_to_queue
        .classify(user, overwrite_from_index, &config.default_queue)
        .to_string();
    state.queues().dispatch(&queue, WorkItem { request_id }, state).await?;
    Ok(queue)
}

/// Scheduling failure path (SPEC_FULL.md §4.7 step 6 / §7 "Scheduling
/// failure"): transition the request to `failed`, notify, and surface 500.
///
/// Goes through `driver::announce` rather than a bare `append_state` so the
/// failed transition is paired with its per-request notification and, if it
/// was the batch's last in-progress member, the per-batch terminal one too
/// (SPEC_FULL.md §4.5) — the same pairing the build driver itself uses.
pub async fn fail_scheduling(state: &AppState, request_id: RequestId) -> ApiError {
    let reason = format!("The scheduling of the build request with ID {request_id} failed");
    crate::driver::announce(state, request_id, iib_events::BuildState::Failed, &reason).await;
    ApiError::internal(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecognized_parameters_rejected_with_listing() {
        let raw = serde_json::json!({"bundles": [], "bogus_option": 1});
        let err = validate_allowed_keys(&raw, &["bundles", "binary_image"]).unwrap_err();
        assert!(matches!(err, DomainError::UnrecognizedParameters(ref v) if v == "bogus_option"));
    }

    #[test]
    fn test_overwrite_token_without_overwrite_rejected() {
        assert!(validate_overwrite_token(false, Some("tok")).is_err());
        assert!(validate_overwrite_token(true, Some("tok")).is_ok());
        assert!(validate_overwrite_token(false, None).is_ok());
    }

    #[test]
    fn test_add_subject_required_without_bundles() {
        assert!(validate_add_subject(false, None, None).is_err());
        assert!(validate_add_subject(false, Some("idx"), Some("bin")).is_ok());
        assert!(validate_add_subject(true, None, None).is_ok());
    }
}
