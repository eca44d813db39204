//! `Image` row storage: dedup-by-`pull_specification` upsert (SPEC_FULL.md
//! §3 invariant 6), with the retry-once-on-conflict policy of §5.

use iib_id::ImageId;
use sqlx::{postgres::PgPool, postgres::PgRow, Row};

use super::DbError;
use crate::domain::Image;

struct ImageRow {
    id: i64,
    pull_specification: String,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ImageRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            pull_specification: row.try_get("pull_specification")?,
        })
    }
}

#[derive(Clone)]
pub struct ImageStore {
    pool: PgPool,
}

impl ImageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert by `pull_specification`. Postgres resolves the race under
    /// `ON CONFLICT`, so no application-level retry is actually needed for
    /// the happy path; the retry-once exists for the rarer case of a
    /// concurrent transaction holding a conflicting lock momentarily.
    pub async fn upsert(&self, pull_specification: &str) -> Result<ImageId, DbError> {
        match self.try_upsert(pull_specification).await {
            Ok(id) => Ok(id),
            Err(e) if e.is_unique_violation() => self.try_upsert(pull_specification).await,
            Err(e) => Err(e),
        }
    }

    async fn try_upsert(&self, pull_specification: &str) -> Result<ImageId, DbError> {
        let row = sqlx::query_as::<_, ImageRow>(
            r#"
            INSERT INTO image (pull_specification)
            VALUES ($1)
            ON CONFLICT (pull_specification) DO UPDATE SET pull_specification = EXCLUDED.pull_specification
            RETURNING id, pull_specification
            "#,
        )
        .bind(pull_specification)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(ImageId::new(row.id))
    }

    pub async fn get(&self, id: ImageId) -> Result<Option<Image>, DbError> {
        let row = sqlx::query_as::<_, ImageRow>(
            "SELECT id, pull_specification FROM image WHERE id = $1",
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        let Some(row) = row else { return Ok(None) };

        let architectures: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT architecture.name FROM architecture
            JOIN image_architecture ON image_architecture.architecture_id = architecture.id
            WHERE image_architecture.image_id = $1
            ORDER BY architecture.name
            "#,
        )
        .bind(id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(Some(Image {
            id: ImageId::new(row.id),
            pull_specification: row.pull_specification,
            architectures,
        }))
    }

    /// Associate an architecture name with an image, creating the
    /// `architecture` row if it does not exist yet.
    pub async fn add_architecture(&self, image_id: ImageId, name: &str) -> Result<(), DbError> {
        let arch_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO architecture (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::Query)?;

        sqlx::query(
            "INSERT INTO image_architecture (image_id, architecture_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(image_id.value())
        .bind(arch_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(())
    }
}
