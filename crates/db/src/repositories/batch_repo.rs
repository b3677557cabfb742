//! Repository for the `batches` table.

use faceforge_core::types::DbId;
use sqlx::{PgExecutor, PgPool};

use crate::models::batch::{Batch, NewBatch};

/// Column list for `batches` queries.
const COLUMNS: &str = "\
    id, uid, first_photo_id, second_photo_id, template_ids, total_tasks, \
    created_at, completed_at";

/// Default page size for batch listing.
const DEFAULT_LIMIT: i64 = 50;

/// Maximum page size for batch listing.
const MAX_LIMIT: i64 = 100;

/// Provides CRUD operations for batches.
pub struct BatchRepo;

impl BatchRepo {
    /// Insert a new batch. Runs on any executor so creation can share the
    /// task-insert transaction.
    pub async fn insert<'e>(
        executor: impl PgExecutor<'e>,
        input: &NewBatch,
    ) -> Result<Batch, sqlx::Error> {
        let query = format!(
            "INSERT INTO batches \
                 (uid, first_photo_id, second_photo_id, template_ids, total_tasks) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Batch>(&query)
            .bind(&input.uid)
            .bind(input.first_photo_id)
            .bind(input.second_photo_id)
            .bind(serde_json::json!(input.template_ids))
            .bind(input.total_tasks)
            .fetch_one(executor)
            .await
    }

    /// Find a batch by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Batch>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM batches WHERE id = $1");
        sqlx::query_as::<_, Batch>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a batch by its externally visible uid.
    pub async fn find_by_uid(pool: &PgPool, uid: &str) -> Result<Option<Batch>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM batches WHERE uid = $1");
        sqlx::query_as::<_, Batch>(&query)
            .bind(uid)
            .fetch_optional(pool)
            .await
    }

    /// List batches, most recent first.
    pub async fn list(
        pool: &PgPool,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Batch>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = offset.unwrap_or(0);
        let query = format!(
            "SELECT {COLUMNS} FROM batches \
             ORDER BY created_at DESC \
             LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, Batch>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Stamp `completed_at` once, the first time all children are observed
    /// terminal. Idempotent.
    pub async fn stamp_completed(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE batches SET completed_at = NOW() WHERE id = $1 AND completed_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
