//! Idempotency helpers for retry-safe write endpoints.
//!
//! IIB has no per-tenant scoping, so the key tuple is simply
//! `(actor_id, endpoint_name, idempotency_key)` — see `db::IdempotencyStore`.

use axum::http::StatusCode;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::api::error::ApiError;
use crate::db::IdempotencyCheck;
use crate::state::AppState;

fn canonicalize_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<String> = map.keys().cloned().collect();
            keys.sort();

            let mut ordered = serde_json::Map::new();
            for key in keys {
                if let Some(mut value) = map.remove(&key) {
                    canonicalize_json(&mut value);
                    ordered.insert(key, value);
                }
            }

            *map = ordered;
        }
        serde_json::Value::Array(items) => {
            for item in items {
                canonicalize_json(item);
            }
        }
        _ => {}
    }
}

pub fn request_hash(endpoint_name: &str, request: &impl Serialize) -> Result<String, ApiError> {
    let mut value = serde_json::to_value(request)
        .map_err(|e| ApiError::internal(format!("Failed to serialize request body: {e}")))?;

    canonicalize_json(&mut value);
    let canonical = serde_json::to_string(&value)
        .map_err(|e| ApiError::internal(format!("Failed to serialize canonical request body: {e}")))?;

    let mut hasher = Sha256::new();
    hasher.update(endpoint_name.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

pub async fn check(
    state: &AppState,
    actor_id: &str,
    endpoint_name: &str,
    idempotency_key: &str,
    request_hash: &str,
) -> Result<Option<(StatusCode, Option<serde_json::Value>)>, ApiError> {
    let store = state.db().idempotency();
    let check = store
        .check(actor_id, endpoint_name, idempotency_key, request_hash)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to check idempotency record");
            ApiError::internal("failed to process request")
        })?;

    match check {
        IdempotencyCheck::NotFound => Ok(None),
        IdempotencyCheck::Found(record) => {
            let status = StatusCode::from_u16(record.response_status_code as u16)
                .unwrap_or(StatusCode::OK);
            Ok(Some((status, record.response_body)))
        }
        IdempotencyCheck::Conflict => Err(ApiError::conflict(
            "Idempotency-Key was already used with a different request body",
        )),
    }
}

pub async fn store(
    state: &AppState,
    actor_id: &str,
    endpoint_name: &str,
    idempotency_key: &str,
    request_hash: &str,
    status: StatusCode,
    body: Option<serde_json::Value>,
) -> Result<(), ApiError> {
    let store = state.db().idempotency();
    store
        .store(
            actor_id,
            endpoint_name,
            idempotency_key,
            request_hash,
            status.as_u16() as i32,
            body,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to store idempotency record");
            ApiError::internal("failed to process request")
        })
}
