//! Idempotency record storage.
//!
//! Keyed by `(actor_id, endpoint_name, idempotency_key)` rather than the
//! teacher's `(org_id, actor_id, endpoint_name, idempotency_key)`: IIB has
//! no organization/tenant scoping for its dispatcher endpoints.

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, postgres::PgRow, Row};

use super::DbError;

#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub actor_id: String,
    pub endpoint_name: String,
    pub idempotency_key: String,
    pub request_hash: String,
    pub response_status_code: i32,
    pub response_body: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for IdempotencyRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            actor_id: row.try_get("actor_id")?,
            endpoint_name: row.try_get("endpoint_name")?,
            idempotency_key: row.try_get("idempotency_key")?,
            request_hash: row.try_get("request_hash")?,
            response_status_code: row.try_get("response_status_code")?,
            response_body: row.try_get("response_body")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug)]
pub enum IdempotencyCheck {
    NotFound,
    Found(IdempotencyRecord),
    Conflict,
}

#[derive(Clone)]
pub struct IdempotencyStore {
    pool: PgPool,
}

impl IdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn check(
        &self,
        actor_id: &str,
        endpoint_name: &str,
        idempotency_key: &str,
        request_hash: &str,
    ) -> Result<IdempotencyCheck, DbError> {
        let record = sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            SELECT actor_id, endpoint_name, idempotency_key, request_hash,
                   response_status_code, response_body, created_at
            FROM idempotency_key
            WHERE actor_id = $1 AND endpoint_name = $2 AND idempotency_key = $3
            "#,
        )
        .bind(actor_id)
        .bind(endpoint_name)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(match record {
            None => IdempotencyCheck::NotFound,
            Some(r) if r.request_hash == request_hash => IdempotencyCheck::Found(r),
            Some(_) => IdempotencyCheck::Conflict,
        })
    }

    pub async fn store(
        &self,
        actor_id: &str,
        endpoint_name: &str,
        idempotency_key: &str,
        request_hash: &str,
        response_status_code: i32,
        response_body: Option<serde_json::Value>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_key (
                actor_id, endpoint_name, idempotency_key, request_hash,
                response_status_code, response_body
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (actor_id, endpoint_name, idempotency_key) DO NOTHING
            "#,
        )
        .bind(actor_id)
        .bind(endpoint_name)
        .bind(idempotency_key)
        .bind(request_hash)
        .bind(response_status_code)
        .bind(response_body)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(())
    }

    /// Minimum 24h retention is a dispatcher requirement (SPEC_FULL.md §4.6);
    /// this only ever deletes records older than that.
    pub async fn cleanup_expired(&self, max_age_hours: i64) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"DELETE FROM idempotency_key WHERE created_at < now() - ($1 || ' hours')::interval"#,
        )
        .bind(max_age_hours)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(result.rows_affected())
    }
}
