//! Request-scoped context extracted from HTTP requests.
//!
//! The surrounding service is responsible for authentication and injects
//! the caller's identity as a principal header (SPEC_FULL.md §6 "All write
//! endpoints require authentication via a bearer identity exposed as a
//! per-request principal header"); this core treats its absence as
//! anonymous rather than performing any token verification itself.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use iib_id::RequestId;

use crate::api::error::ApiError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
pub const PRINCIPAL_HEADER: &str = "x-iib-principal";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub idempotency_key: Option<String>,
    /// `None` means anonymous — the surrounding auth layer injected nothing.
    pub user: Option<String>,
}

impl RequestContext {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id =
            header_string(&parts.headers, "x-request-id").unwrap_or_else(|| RequestId::new(0).to_string());

        let idempotency_key = header_string(&parts.headers, IDEMPOTENCY_KEY_HEADER);
        if let Some(key) = &idempotency_key {
            if !(8..=128).contains(&key.len()) {
                return Err(ApiError::bad_request(
                    "Idempotency-Key must be between 8 and 128 characters",
                ));
            }
        }

        let user = header_string(&parts.headers, PRINCIPAL_HEADER);

        Ok(Self {
            request_id,
            idempotency_key,
            user,
        })
    }
}
