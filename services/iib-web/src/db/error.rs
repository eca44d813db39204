//! Database error types.

use thiserror::Error;

use crate::domain::DomainError;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    #[error("request {0} not found")]
    RequestNotFound(i64),

    #[error("batch {0} not found")]
    BatchNotFound(i64),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("idempotency key reused with different request body")]
    IdempotencyConflict,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    /// Whether a retry of the same operation is worth attempting
    /// (SPEC_FULL.md §5 "Image upserts must tolerate concurrent inserts").
    pub fn is_retryable(&self) -> bool {
        match self {
            DbError::Connect(_) => true,
            DbError::Query(e) => is_retryable_sqlx_error(e),
            _ => false,
        }
    }

    /// True for a unique-constraint violation (Postgres `23505`), the
    /// signal for the image-upsert retry-once policy.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::Query(e) if matches!(
            e,
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505")
        ))
    }
}

fn is_retryable_sqlx_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Io(_) => true,
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::PoolClosed => false,
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                matches!(
                    code.as_ref(),
                    "40001" | // serialization_failure
                    "40P01" | // deadlock_detected
                    "57P01" | // admin_shutdown
                    "57P02" | // crash_shutdown
                    "57P03" // cannot_connect_now
                )
            } else {
                false
            }
        }
        _ => false,
    }
}
