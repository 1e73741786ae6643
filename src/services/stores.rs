//! Read-only stores behind the retrieval engine.
//!
//! The engine depends on the [`TakeoffStore`] and [`SnippetStore`] traits;
//! the Postgres implementations here are the production bindings. Nothing in
//! this module writes.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::BlueprintSnippet;
use crate::error::StoreError;

/// Latest-snapshot access to persisted takeoff records.
#[async_trait]
pub trait TakeoffStore: Send + Sync {
    /// Load the most recent raw takeoff blob for a plan/user scope, or `None`
    /// when no record exists. The blob may be a JSON array, a JSON-encoded
    /// string, or an envelope object; normalization happens downstream.
    async fn load_latest_takeoff(
        &self,
        plan_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Value>, StoreError>;
}

/// Access to indexed blueprint text fragments.
#[async_trait]
pub trait SnippetStore: Send + Sync {
    /// Fetch snippets for specific page numbers, ordered by page.
    async fn fetch_by_page(
        &self,
        plan_id: Uuid,
        pages: &[i64],
        limit: usize,
    ) -> Result<Vec<BlueprintSnippet>, StoreError>;

    /// Rank snippets against free question text.
    async fn search_by_similarity(
        &self,
        plan_id: Uuid,
        query: &str,
        limit: usize,
    ) -> Result<Vec<BlueprintSnippet>, StoreError>;
}

/// Postgres-backed takeoff snapshots.
#[derive(Clone)]
pub struct PgTakeoffStore {
    pool: PgPool,
}

impl PgTakeoffStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TakeoffStore for PgTakeoffStore {
    async fn load_latest_takeoff(
        &self,
        plan_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Value>, StoreError> {
        let data: Option<Value> = sqlx::query_scalar(
            "SELECT data FROM takeoff_records
             WHERE plan_id = $1 AND user_id = $2
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(plan_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(data)
    }
}

/// Postgres-backed blueprint text fragments, ranked with full-text search.
#[derive(Clone)]
pub struct PgSnippetStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct SnippetRow {
    content: String,
    page_number: Option<i32>,
    sheet_name: Option<String>,
}

impl From<SnippetRow> for BlueprintSnippet {
    fn from(row: SnippetRow) -> Self {
        Self {
            text: row.content,
            page_number: row.page_number.map(i64::from),
            sheet_name: row.sheet_name,
        }
    }
}

impl PgSnippetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnippetStore for PgSnippetStore {
    async fn fetch_by_page(
        &self,
        plan_id: Uuid,
        pages: &[i64],
        limit: usize,
    ) -> Result<Vec<BlueprintSnippet>, StoreError> {
        let pages: Vec<i32> = pages.iter().map(|p| *p as i32).collect();

        let rows: Vec<SnippetRow> = sqlx::query_as(
            "SELECT content, page_number, sheet_name FROM blueprint_chunks
             WHERE plan_id = $1 AND page_number = ANY($2)
             ORDER BY page_number ASC, chunk_index ASC
             LIMIT $3",
        )
        .bind(plan_id)
        .bind(&pages)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn search_by_similarity(
        &self,
        plan_id: Uuid,
        query: &str,
        limit: usize,
    ) -> Result<Vec<BlueprintSnippet>, StoreError> {
        let rows: Vec<SnippetRow> = sqlx::query_as(
            "SELECT content, page_number, sheet_name FROM blueprint_chunks
             WHERE plan_id = $1
               AND to_tsvector('english', content) @@ plainto_tsquery('english', $2)
             ORDER BY ts_rank(to_tsvector('english', content),
                              plainto_tsquery('english', $2)) DESC
             LIMIT $3",
        )
        .bind(plan_id)
        .bind(query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
