//! `Batch` persistence (SPEC_FULL.md §3/§4.7 "Batch endpoints").

use iib_events::BuildState;
use iib_id::BatchId;
use sqlx::{postgres::PgPool, postgres::PgRow, Row};

use super::DbError;
use crate::domain::Batch;

impl<'r> sqlx::FromRow<'r, PgRow> for Batch {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let id: i64 = row.try_get("id")?;
        Ok(Self {
            id: BatchId::new(id),
            annotations: row.try_get("annotations")?,
        })
    }
}

#[derive(Clone)]
pub struct BatchStore {
    pool: PgPool,
}

impl BatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, annotations: serde_json::Value) -> Result<Batch, DbError> {
        sqlx::query_as::<_, Batch>(
            "INSERT INTO batch (annotations) VALUES ($1) RETURNING id, annotations",
        )
        .bind(annotations)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    pub async fn get(&self, id: BatchId) -> Result<Option<Batch>, DbError> {
        sqlx::query_as::<_, Batch>("SELECT id, annotations FROM batch WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    /// The per-member states feeding `Batch::derived_state`.
    pub async fn member_states(&self, id: BatchId) -> Result<Vec<BuildState>, DbError> {
        let rows: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT rs.state FROM request r
            JOIN request_state rs ON rs.id = r.current_state_id
            WHERE r.batch_id = $1
            "#,
        )
        .bind(id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.into_iter()
            .map(|s| {
                BuildState::parse(&s).ok_or_else(|| {
                    DbError::Domain(crate::domain::DomainError::UnknownState(
                        s.clone(),
                        "complete, failed, in_progress".to_string(),
                    ))
                })
            })
            .collect()
    }
}
