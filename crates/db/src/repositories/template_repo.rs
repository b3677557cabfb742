//! Repository for the `templates` table.
//!
//! Preprocessing status moves through compare-and-swap updates so that
//! submission stays idempotent and two runners can never claim the same
//! template.

use faceforge_core::types::DbId;
use sqlx::PgPool;

use crate::models::status::PreprocessingStatus;
use crate::models::template::{NewTemplate, Template};

/// Column list for `templates` queries.
const COLUMNS: &str = "\
    id, name, original_resource_id, preprocessing_status_id, faces, \
    masked_resource_id, error_detail, created_at, updated_at";

/// Provides CRUD operations for templates.
pub struct TemplateRepo;

impl TemplateRepo {
    /// Insert a new template in `NotStarted` state with no faces.
    pub async fn insert(pool: &PgPool, input: &NewTemplate) -> Result<Template, sqlx::Error> {
        let query = format!(
            "INSERT INTO templates (name, original_resource_id, preprocessing_status_id, faces) \
             VALUES ($1, $2, $3, '[]'::jsonb) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Template>(&query)
            .bind(&input.name)
            .bind(input.original_resource_id)
            .bind(PreprocessingStatus::NotStarted.id())
            .fetch_one(pool)
            .await
    }

    /// Find a template by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Template>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM templates WHERE id = $1");
        sqlx::query_as::<_, Template>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find several templates at once; missing ids are simply absent.
    pub async fn find_by_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<Template>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM templates WHERE id = ANY($1)");
        sqlx::query_as::<_, Template>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Move `NotStarted`/`Failed` to `Pending`, clearing any stale error.
    ///
    /// Returns `true` if the transition happened. A `false` return with
    /// the template already `Pending`/`Processing` is the idempotent
    /// no-op case; re-submission while work is queued changes nothing.
    pub async fn submit_preprocessing(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE templates \
             SET preprocessing_status_id = $2, error_detail = NULL, updated_at = NOW() \
             WHERE id = $1 AND preprocessing_status_id IN ($3, $4)",
        )
        .bind(id)
        .bind(PreprocessingStatus::Pending.id())
        .bind(PreprocessingStatus::NotStarted.id())
        .bind(PreprocessingStatus::Failed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically claim a `Pending` template for processing.
    ///
    /// Returns the claimed row, or `None` when the template is not
    /// pending — which is how a second concurrent runner loses the race.
    pub async fn claim_processing(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<Template>, sqlx::Error> {
        let query = format!(
            "UPDATE templates \
             SET preprocessing_status_id = $2, updated_at = NOW() \
             WHERE id = $1 AND preprocessing_status_id = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Template>(&query)
            .bind(id)
            .bind(PreprocessingStatus::Processing.id())
            .bind(PreprocessingStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Next `Pending` template in submission order, claimed for processing.
    pub async fn claim_next_pending(pool: &PgPool) -> Result<Option<Template>, sqlx::Error> {
        let query = format!(
            "UPDATE templates \
             SET preprocessing_status_id = $1, updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM templates \
                 WHERE preprocessing_status_id = $2 \
                 ORDER BY updated_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Template>(&query)
            .bind(PreprocessingStatus::Processing.id())
            .bind(PreprocessingStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Record a successful preprocessing run: faces, masked variant, and
    /// the `Completed` status land in one update.
    pub async fn complete_preprocessing(
        pool: &PgPool,
        id: DbId,
        faces: &serde_json::Value,
        masked_resource_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE templates \
             SET preprocessing_status_id = $2, faces = $3, masked_resource_id = $4, \
                 error_detail = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(PreprocessingStatus::Completed.id())
        .bind(faces)
        .bind(masked_resource_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a failed preprocessing run. Faces stay empty.
    pub async fn fail_preprocessing(
        pool: &PgPool,
        id: DbId,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE templates \
             SET preprocessing_status_id = $2, error_detail = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(PreprocessingStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Administrative re-preprocess: back to `Pending` with prior faces,
    /// masked reference, and error cleared in a single atomic update.
    ///
    /// Returns the prior masked resource id so the caller can retire the
    /// now-orphaned variant.
    pub async fn reset_preprocessing(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<Option<DbId>>, sqlx::Error> {
        // The self-join in FROM exposes the pre-update row, so RETURNING
        // can hand back the old masked_resource_id.
        let previous_masked: Option<(Option<DbId>,)> = sqlx::query_as(
            "UPDATE templates \
             SET preprocessing_status_id = $2, faces = '[]'::jsonb, \
                 masked_resource_id = NULL, error_detail = NULL, updated_at = NOW() \
             FROM templates prev \
             WHERE templates.id = $1 AND prev.id = templates.id \
             RETURNING prev.masked_resource_id",
        )
        .bind(id)
        .bind(PreprocessingStatus::Pending.id())
        .fetch_optional(pool)
        .await?;
        Ok(previous_masked.map(|row| row.0))
    }
}
