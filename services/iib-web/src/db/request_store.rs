//! Persistence for the polymorphic `Request`/`RequestState` (SPEC_FULL.md
//! §4.6): a parent `request` table joined by shared id to one side table per
//! request type, each holding its payload as a JSONB column (the `json`
//! sqlx feature is enabled workspace-wide for exactly this).

use chrono::{DateTime, Utc};
use iib_events::{BuildState, RequestType};
use iib_id::{BatchId, ImageId, RequestId, RequestStateId};
use sqlx::{postgres::PgPool, postgres::PgRow, Postgres, Row, Transaction};

use super::image_store::ImageStore;
use super::DbError;
use crate::domain::{
    AddDeprecationsPayload, AddPayload, CreateEmptyIndexPayload, FbcOperationsPayload,
    MergeIndexImagePayload, RecursiveRelatedBundlesPayload, RegenerateBundlePayload, Request,
    RequestPayload, RequestState, RmPayload,
};

/// Filters accepted by `GET /builds` (SPEC_FULL.md §6).
#[derive(Debug, Clone, Default)]
pub struct RequestFilters {
    pub state: Option<BuildState>,
    pub batch: Option<BatchId>,
}

/// The worker-only partial update accepted by `PATCH /builds/<id>`
/// (SPEC_FULL.md §6).
#[derive(Debug, Clone, Default)]
pub struct RequestPatch {
    pub architectures: Option<Vec<String>>,
    pub binary_image_resolved: Option<String>,
    pub index_image_resolved: Option<String>,
    pub internal_index_image_copy: Option<String>,
    pub internal_index_image_copy_resolved: Option<String>,
    pub bundle_mapping: Option<std::collections::HashMap<String, Vec<String>>>,
    pub state: Option<(BuildState, String)>,
}

struct RequestRow {
    id: i64,
    request_type: String,
    batch_id: i64,
    user_id: Option<String>,
    current_state_id: Option<i64>,
    architectures: Vec<String>,
    binary_image: Option<String>,
    binary_image_resolved: Option<String>,
    index_image: Option<String>,
    index_image_resolved: Option<String>,
    internal_index_image_copy: Option<String>,
    internal_index_image_copy_resolved: Option<String>,
    build_tags: Vec<String>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for RequestRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            request_type: row.try_get("type")?,
            batch_id: row.try_get("batch_id")?,
            user_id: row.try_get("user_id")?,
            current_state_id: row.try_get("current_state_id")?,
            architectures: row.try_get("architectures")?,
            binary_image: row.try_get("binary_image")?,
            binary_image_resolved: row.try_get("binary_image_resolved")?,
            index_image: row.try_get("index_image")?,
            index_image_resolved: row.try_get("index_image_resolved")?,
            internal_index_image_copy: row.try_get("internal_index_image_copy")?,
            internal_index_image_copy_resolved: row.try_get("internal_index_image_copy_resolved")?,
            build_tags: row.try_get("build_tags")?,
        })
    }
}

struct RequestStateRow {
    id: i64,
    request_id: i64,
    state: String,
    state_reason: String,
    updated: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for RequestStateRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            request_id: row.try_get("request_id")?,
            state: row.try_get("state")?,
            state_reason: row.try_get("state_reason")?,
            updated: row.try_get("updated")?,
        })
    }
}

fn side_table_name(t: RequestType) -> &'static str {
    match t {
        RequestType::Add => "request_add",
        RequestType::Rm => "request_rm",
        RequestType::RegenerateBundle => "request_regenerate_bundle",
        RequestType::MergeIndexImage => "request_merge_index_image",
        RequestType::CreateEmptyIndex => "request_create_empty_index",
        RequestType::FbcOperations => "request_fbc_operations",
        RequestType::AddDeprecations => "request_add_deprecations",
        RequestType::RecursiveRelatedBundles => "request_recursive_related_bundles",
    }
}

#[derive(Clone)]
pub struct RequestStore {
    pool: PgPool,
}

impl RequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a request and its side-table row atomically (invariant 4),
    /// append the initial `in_progress` state, and for `add`/`fbc-operations`
    /// resolve+dedup the referenced bundle/fragment images (invariant 6).
    pub async fn create(
        &self,
        batch_id: BatchId,
        user_id: Option<String>,
        build_tags: Vec<String>,
        payload: RequestPayload,
    ) -> Result<Request, DbError> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;

        let row: RequestRow = sqlx::query_as(
            r#"
            INSERT INTO request (type, batch_id, user_id, architectures, build_tags)
            VALUES ($1, $2, $3, '{}', $4)
            RETURNING id, type, batch_id, user_id, current_state_id, architectures,
                      binary_image, binary_image_resolved, index_image, index_image_resolved,
                      internal_index_image_copy, internal_index_image_copy_resolved, build_tags
            "#,
        )
        .bind(payload.request_type().as_str())
        .bind(batch_id.value())
        .bind(&user_id)
        .bind(&build_tags)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        let request_id = RequestId::new(row.id);

        self.insert_side_table(&mut tx, request_id, &payload).await?;

        if let RequestPayload::Add(add) = &payload {
            self.link_images(&mut tx, request_id, "request_bundle", &add.bundles)
                .await?;
        }
        if let RequestPayload::FbcOperations(fbc) = &payload {
            self.link_images(&mut tx, request_id, "request_fbc_fragment", &fbc.fbc_fragments)
                .await?;
        }

        let state_row: RequestStateRow = sqlx::query_as(
            r#"
            INSERT INTO request_state (request_id, state, state_reason, updated)
            VALUES ($1, $2, $3, now())
            RETURNING id, request_id, state, state_reason, updated
            "#,
        )
        .bind(row.id)
        .bind(BuildState::InProgress.as_str())
        .bind("The request was initiated")
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        sqlx::query("UPDATE request SET current_state_id = $1 WHERE id = $2")
            .bind(state_row.id)
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;

        tx.commit().await.map_err(DbError::Query)?;

        Ok(Request {
            id: request_id,
            batch_id,
            user_id,
            current_state_id: Some(RequestStateId::new(state_row.id)),
            architectures: vec![],
            binary_image: row.binary_image,
            binary_image_resolved: row.binary_image_resolved,
            index_image: row.index_image,
            index_image_resolved: row.index_image_resolved,
            internal_index_image_copy: row.internal_index_image_copy,
            internal_index_image_copy_resolved: row.internal_index_image_copy_resolved,
            build_tags,
            states: vec![RequestState {
                id: RequestStateId::new(state_row.id),
                request_id,
                state: BuildState::InProgress,
                state_reason: "The request was initiated".to_string(),
                updated: state_row.updated,
            }],
            payload,
        })
    }

    async fn link_images(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        request_id: RequestId,
        join_table: &str,
        pull_specs: &[String],
    ) -> Result<(), DbError> {
        let images = ImageStore::new(self.pool.clone());
        for spec in pull_specs {
            let image_id = images.upsert(spec).await?;
            let sql = format!(
                "INSERT INTO {join_table} (request_id, image_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
            );
            sqlx::query(&sql)
                .bind(request_id.value())
                .bind(image_id.value())
                .execute(&mut **tx)
                .await
                .map_err(DbError::Query)?;
        }
        Ok(())
    }

    async fn insert_side_table(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        request_id: RequestId,
        payload: &RequestPayload,
    ) -> Result<(), DbError> {
        let table = side_table_name(payload.request_type());
        let json = match payload {
            RequestPayload::Add(p) => serde_json::to_value(p)?,
            RequestPayload::Rm(p) => serde_json::to_value(p)?,
            RequestPayload::RegenerateBundle(p) => serde_json::to_value(p)?,
            RequestPayload::MergeIndexImage(p) => serde_json::to_value(p)?,
            RequestPayload::CreateEmptyIndex(p) => serde_json::to_value(p)?,
            RequestPayload::FbcOperations(p) => serde_json::to_value(p)?,
            RequestPayload::AddDeprecations(p) => serde_json::to_value(p)?,
            RequestPayload::RecursiveRelatedBundles(p) => serde_json::to_value(p)?,
        };
        let sql = format!("INSERT INTO {table} (request_id, payload) VALUES ($1, $2)");
        sqlx::query(&sql)
            .bind(request_id.value())
            .bind(json)
            .execute(&mut **tx)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }

    /// Append a new `RequestState`, validating the transition first
    /// (SPEC_FULL.md §4.6 `add_state`).
    pub async fn append_state(
        &self,
        request_id: RequestId,
        state: BuildState,
        reason: &str,
    ) -> Result<RequestState, DbError> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;

        let current: Option<String> = sqlx::query_scalar(
            r#"
            SELECT rs.state FROM request r
            JOIN request_state rs ON rs.id = r.current_state_id
            WHERE r.id = $1
            "#,
        )
        .bind(request_id.value())
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        let current_state = current.as_deref().and_then(BuildState::parse);

        crate::domain::Request::validate_transition(current_state, state)?;

        let row: RequestStateRow = sqlx::query_as(
            r#"
            INSERT INTO request_state (request_id, state, state_reason, updated)
            VALUES ($1, $2, $3, now())
            RETURNING id, request_id, state, state_reason, updated
            "#,
        )
        .bind(request_id.value())
        .bind(state.as_str())
        .bind(reason)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        sqlx::query("UPDATE request SET current_state_id = $1 WHERE id = $2")
            .bind(row.id)
            .bind(request_id.value())
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;

        tx.commit().await.map_err(DbError::Query)?;

        Ok(RequestState {
            id: RequestStateId::new(row.id),
            request_id,
            state,
            state_reason: row.state_reason,
            updated: row.updated,
        })
    }

    /// Load a request with its side-table payload and, when `verbose`, its
    /// full state history.
    pub async fn get(&self, id: RequestId, verbose: bool) -> Result<Option<Request>, DbError> {
        let Some(row) = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT id, type, batch_id, user_id, current_state_id, architectures,
                   binary_image, binary_image_resolved, index_image, index_image_resolved,
                   internal_index_image_copy, internal_index_image_copy_resolved, build_tags
            FROM request WHERE id = $1
            "#,
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?
        else {
            return Ok(None);
        };

        let request_type = RequestType::parse(&row.request_type)
            .ok_or_else(|| DbError::Domain(crate::domain::DomainError::UnknownRequestType(row.request_type.clone())))?;

        let payload = self.load_side_table(id, request_type).await?;

        let states = if verbose {
            self.state_history(id).await?
        } else if let Some(current_id) = row.current_state_id {
            self.state_history(id)
                .await?
                .into_iter()
                .filter(|s| s.id.value() == current_id)
                .collect()
        } else {
            vec![]
        };

        Ok(Some(Request {
            id,
            batch_id: BatchId::new(row.batch_id),
            user_id: row.user_id,
            current_state_id: row.current_state_id.map(RequestStateId::new),
            architectures: row.architectures,
            binary_image: row.binary_image,
            binary_image_resolved: row.binary_image_resolved,
            index_image: row.index_image,
            index_image_resolved: row.index_image_resolved,
            internal_index_image_copy: row.internal_index_image_copy,
            internal_index_image_copy_resolved: row.internal_index_image_copy_resolved,
            build_tags: row.build_tags,
            states,
            payload,
        }))
    }

    async fn load_side_table(
        &self,
        id: RequestId,
        request_type: RequestType,
    ) -> Result<RequestPayload, DbError> {
        let table = side_table_name(request_type);
        let sql = format!("SELECT payload FROM {table} WHERE request_id = $1");
        let json: serde_json::Value = sqlx::query_scalar(&sql)
            .bind(id.value())
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Query)?;

        Ok(match request_type {
            RequestType::Add => RequestPayload::Add(serde_json::from_value::<AddPayload>(json)?),
            RequestType::Rm => RequestPayload::Rm(serde_json::from_value::<RmPayload>(json)?),
            RequestType::RegenerateBundle => {
                RequestPayload::RegenerateBundle(serde_json::from_value::<RegenerateBundlePayload>(json)?)
            }
            RequestType::MergeIndexImage => {
                RequestPayload::MergeIndexImage(serde_json::from_value::<MergeIndexImagePayload>(json)?)
            }
            RequestType::CreateEmptyIndex => {
                RequestPayload::CreateEmptyIndex(serde_json::from_value::<CreateEmptyIndexPayload>(json)?)
            }
            RequestType::FbcOperations => {
                RequestPayload::FbcOperations(serde_json::from_value::<FbcOperationsPayload>(json)?)
            }
            RequestType::AddDeprecations => {
                RequestPayload::AddDeprecations(serde_json::from_value::<AddDeprecationsPayload>(json)?)
            }
            RequestType::RecursiveRelatedBundles => RequestPayload::RecursiveRelatedBundles(
                serde_json::from_value::<RecursiveRelatedBundlesPayload>(json)?,
            ),
        })
    }

    async fn state_history(&self, id: RequestId) -> Result<Vec<RequestState>, DbError> {
        let rows: Vec<RequestStateRow> = sqlx::query_as(
            r#"
            SELECT id, request_id, state, state_reason, updated FROM request_state
            WHERE request_id = $1
            ORDER BY updated ASC, id ASC
            "#,
        )
        .bind(id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.into_iter()
            .map(|r| {
                let state = BuildState::parse(&r.state).ok_or_else(|| {
                    DbError::Domain(crate::domain::DomainError::UnknownState(
                        r.state.clone(),
                        "complete, failed, in_progress".to_string(),
                    ))
                })?;
                Ok(RequestState {
                    id: RequestStateId::new(r.id),
                    request_id: RequestId::new(r.request_id),
                    state,
                    state_reason: r.state_reason,
                    updated: r.updated,
                })
            })
            .collect()
    }

    /// Paged listing (SPEC_FULL.md §6 `GET /builds`). `page` is 1-based.
    pub async fn list(
        &self,
        filters: RequestFilters,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Request>, i64), DbError> {
        let mut where_clauses = Vec::new();
        if filters.state.is_some() {
            where_clauses.push("rs.state = $1".to_string());
        }
        if filters.batch.is_some() {
            let idx = if filters.state.is_some() { 2 } else { 1 };
            where_clauses.push(format!("r.batch_id = ${idx}"));
        }
        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let count_sql = format!(
            "SELECT count(*) FROM request r JOIN request_state rs ON rs.id = r.current_state_id {where_sql}"
        );
        let mut count_query = sqlx::query_scalar(&count_sql);
        if let Some(state) = filters.state {
            count_query = count_query.bind(state.as_str().to_string());
        }
        if let Some(batch) = filters.batch {
            count_query = count_query.bind(batch.value());
        }
        let total: i64 = count_query.fetch_one(&self.pool).await.map_err(DbError::Query)?;

        let list_sql = format!(
            r#"
            SELECT r.id FROM request r
            JOIN request_state rs ON rs.id = r.current_state_id
            {where_sql}
            ORDER BY r.id DESC
            LIMIT {per_page} OFFSET {offset}
            "#,
            offset = (page - 1).max(0) * per_page
        );
        let mut list_query = sqlx::query_scalar(&list_sql);
        if let Some(state) = filters.state {
            list_query = list_query.bind(state.as_str().to_string());
        }
        if let Some(batch) = filters.batch {
            list_query = list_query.bind(batch.value());
        }
        let ids: Vec<i64> = list_query.fetch_all(&self.pool).await.map_err(DbError::Query)?;

        let mut requests = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(request) = self.get(RequestId::new(id), false).await? {
                requests.push(request);
            }
        }

        Ok((requests, total))
    }

    /// Worker-only partial update (`PATCH /builds/<id>`). A `state` change
    /// goes through the same transition validation as `append_state`.
    pub async fn patch(&self, id: RequestId, patch: RequestPatch) -> Result<Request, DbError> {
        if let Some((state, reason)) = &patch.state {
            self.append_state(id, *state, reason).await?;
        }

        if let Some(arches) = &patch.architectures {
            sqlx::query("UPDATE request SET architectures = $1 WHERE id = $2")
                .bind(arches)
                .bind(id.value())
                .execute(&self.pool)
                .await
                .map_err(DbError::Query)?;
        }
        if let Some(v) = &patch.binary_image_resolved {
            sqlx::query("UPDATE request SET binary_image_resolved = $1 WHERE id = $2")
                .bind(v)
                .bind(id.value())
                .execute(&self.pool)
                .await
                .map_err(DbError::Query)?;
        }
        if let Some(v) = &patch.index_image_resolved {
            sqlx::query("UPDATE request SET index_image_resolved = $1 WHERE id = $2")
                .bind(v)
                .bind(id.value())
                .execute(&self.pool)
                .await
                .map_err(DbError::Query)?;
        }
        if let Some(v) = &patch.internal_index_image_copy {
            sqlx::query("UPDATE request SET internal_index_image_copy = $1 WHERE id = $2")
                .bind(v)
                .bind(id.value())
                .execute(&self.pool)
                .await
                .map_err(DbError::Query)?;
        }
        if let Some(v) = &patch.internal_index_image_copy_resolved {
            sqlx::query("UPDATE request SET internal_index_image_copy_resolved = $1 WHERE id = $2")
                .bind(v)
                .bind(id.value())
                .execute(&self.pool)
                .await
                .map_err(DbError::Query)?;
        }
        if let Some(mapping) = &patch.bundle_mapping {
            let row: RequestRow = sqlx::query_as(
                "SELECT id, type, batch_id, user_id, current_state_id, architectures, binary_image, binary_image_resolved, index_image, index_image_resolved, internal_index_image_copy, internal_index_image_copy_resolved, build_tags FROM request WHERE id = $1",
            )
            .bind(id.value())
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Query)?;
            if row.request_type == RequestType::Add.as_str() {
                let mut add: AddPayload = {
                    let json: serde_json::Value = sqlx::query_scalar(
                        "SELECT payload FROM request_add WHERE request_id = $1",
                    )
                    .bind(id.value())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(DbError::Query)?;
                    serde_json::from_value(json)?
                };
                add.bundle_mapping = mapping.clone();
                let json = serde_json::to_value(&add)?;
                sqlx::query("UPDATE request_add SET payload = $1 WHERE request_id = $2")
                    .bind(json)
                    .bind(id.value())
                    .execute(&self.pool)
                    .await
                    .map_err(DbError::Query)?;
            }
        }

        self.get(id, true)
            .await?
            .ok_or(DbError::RequestNotFound(id.value()))
    }

    /// The resolved list of FBC fragment pullspecs linked via
    /// `request_fbc_fragment` (the join-table access path; DESIGN.md's FBC
    /// fragment schema resolution).
    pub async fn fbc_fragments(&self, id: RequestId) -> Result<Vec<String>, DbError> {
        sqlx::query_scalar(
            r#"
            SELECT image.pull_specification FROM image
            JOIN request_fbc_fragment ON request_fbc_fragment.image_id = image.id
            WHERE request_fbc_fragment.request_id = $1
            ORDER BY image.pull_specification
            "#,
        )
        .bind(id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    /// The image ids referencing this request directly via the nullable
    /// `image.fbc_fragment_id` FK — the second access path from the same
    /// schema resolution, maintained independently of the join table.
    pub async fn fbc_fragment_images_by_direct_fk(
        &self,
        id: RequestId,
    ) -> Result<Vec<ImageId>, DbError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM image WHERE fbc_fragment_id = $1 ORDER BY id",
        )
        .bind(id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(ids.into_iter().map(ImageId::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_table_name_covers_every_request_type() {
        for t in [
            RequestType::Add,
            RequestType::Rm,
            RequestType::RegenerateBundle,
            RequestType::MergeIndexImage,
            RequestType::CreateEmptyIndex,
            RequestType::FbcOperations,
            RequestType::AddDeprecations,
            RequestType::RecursiveRelatedBundles,
        ] {
            assert!(side_table_name(t).starts_with("request_"));
        }
    }
}
