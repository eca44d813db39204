//! The API error type and its wire representation.
//!
//! SPEC_FULL.md §6 is explicit and literal: every error response is
//! `{"error": "<human message>"}`, nothing more. `ApiError` keeps a
//! richer internal shape (a status code, a machine code for logging) but
//! `IntoResponse` only ever serializes the `error` field — see DESIGN.md's
//! "Error response shape vs. the teacher's richer `ApiError`" entry.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn gone(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GONE, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<crate::domain::DomainError> for ApiError {
    fn from(e: crate::domain::DomainError) -> Self {
        use crate::domain::DomainError as D;
        match e {
            D::InvalidBatch => ApiError::bad_request(e.to_string()),
            D::UnknownState(..) => ApiError::bad_request(e.to_string()),
            D::UnknownRequestType(_) => ApiError::bad_request(e.to_string()),
            D::UnrecognizedParameters(_) => ApiError::bad_request(e.to_string()),
            D::Validation(_) => ApiError::bad_request(e.to_string()),
            D::TokenWithoutOverwrite => ApiError::bad_request(e.to_string()),
            D::OverwriteRequiresPrivilege => ApiError::forbidden(e.to_string()),
            D::TerminalTransition { .. } => ApiError::internal(e.to_string()),
        }
    }
}

impl From<crate::db::DbError> for ApiError {
    fn from(e: crate::db::DbError) -> Self {
        use crate::db::DbError as E;
        match e {
            E::RequestNotFound(id) => ApiError::not_found(format!("Request {id} not found")),
            E::BatchNotFound(id) => ApiError::not_found(format!("Batch {id} not found")),
            E::Domain(d) => d.into(),
            E::IdempotencyConflict => ApiError::conflict(e.to_string()),
            other => {
                tracing::error!(error = %other, "database error");
                ApiError::internal("internal server error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_body_is_literal_error_field() {
        let err = ApiError::bad_request("The batch must be a positive integer");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
