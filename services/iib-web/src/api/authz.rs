//! Authorization helpers (SPEC_FULL.md §6/§7).
//!
//! Write endpoints require an authenticated caller (401 otherwise); one
//! specific option, `overwrite_from_index` without a token, additionally
//! requires the caller be privileged (403 otherwise) — privilege is the
//! membership test against `IIB_WORKER_USERNAMES` (SPEC_FULL.md §4.9).

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::config::Config;

pub fn require_authenticated(ctx: &RequestContext) -> Result<&str, ApiError> {
    ctx.user
        .as_deref()
        .ok_or_else(|| ApiError::unauthorized("Missing or invalid Authorization token"))
}

pub fn is_privileged(config: &Config, user: &str) -> bool {
    config.worker_usernames.iter().any(|u| u == user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_is_not_authenticated() {
        let ctx = RequestContext {
            request_id: "r1".to_string(),
            idempotency_key: None,
            user: None,
        };
        assert!(require_authenticated(&ctx).is_err());
    }

    #[test]
    fn test_authenticated_returns_user() {
        let ctx = RequestContext {
            request_id: "r1".to_string(),
            idempotency_key: None,
            user: Some("tbrady@DOMAIN.LOCAL".to_string()),
        };
        assert_eq!(require_authenticated(&ctx).unwrap(), "tbrady@DOMAIN.LOCAL");
    }
}
