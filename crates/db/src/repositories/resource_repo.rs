//! Repository for the `resources` table.
//!
//! Deletion is the only destructive operation and always runs through
//! [`ResourceRepo::delete_if_unreferenced`], which checks for active task
//! references inside the same transaction that removes the row.

use faceforge_core::types::{DbId, Timestamp};
use sqlx::{PgExecutor, PgPool};

use crate::models::resource::{NewResource, Resource};
use crate::models::status::{ResourceLifetime, TaskStatus};

/// Column list for `resources` queries.
const COLUMNS: &str = "\
    id, storage_key, width, height, byte_size, lifetime_id, expires_at, \
    group_tag, role_id, created_at";

/// Tasks in these states protect every resource they reference.
const ACTIVE_REFERENCE_QUERY: &str = "\
    SELECT COUNT(*) FROM tasks t \
    LEFT JOIN templates tp ON tp.id = t.template_id \
    WHERE t.status_id IN ($2, $3) \
      AND (t.first_photo_id = $1 \
           OR t.second_photo_id = $1 \
           OR tp.original_resource_id = $1 \
           OR tp.masked_resource_id = $1)";

/// Outcome of a guarded delete.
#[derive(Debug)]
pub enum DeleteOutcome {
    /// The record was removed; the caller now owns blob cleanup.
    Deleted(Resource),
    /// A pending or running task still references the resource.
    InUse { active_tasks: i64 },
    NotFound,
}

/// Provides CRUD operations for stored image records.
pub struct ResourceRepo;

impl ResourceRepo {
    /// Insert a new resource record.
    pub async fn insert<'e>(
        executor: impl PgExecutor<'e>,
        input: &NewResource,
    ) -> Result<Resource, sqlx::Error> {
        let query = format!(
            "INSERT INTO resources \
                 (storage_key, width, height, byte_size, lifetime_id, \
                  expires_at, group_tag, role_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Resource>(&query)
            .bind(&input.storage_key)
            .bind(input.width)
            .bind(input.height)
            .bind(input.byte_size)
            .bind(input.lifetime_id)
            .bind(input.expires_at)
            .bind(&input.group_tag)
            .bind(input.role_id)
            .fetch_one(executor)
            .await
    }

    /// Find a resource by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Resource>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM resources WHERE id = $1");
        sqlx::query_as::<_, Resource>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find several resources at once; missing ids are simply absent.
    pub async fn find_by_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<Resource>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM resources WHERE id = ANY($1)");
        sqlx::query_as::<_, Resource>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Flip a resource to permanent, clearing any expiry.
    ///
    /// Returns `false` if no such resource exists.
    pub async fn mark_permanent(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE resources SET lifetime_id = $2, expires_at = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(ResourceLifetime::Permanent.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Temporary resources whose expiry has passed at `now`.
    pub async fn find_expired_temporary(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<Vec<Resource>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM resources \
             WHERE lifetime_id = $1 AND expires_at IS NOT NULL AND expires_at < $2 \
             ORDER BY expires_at ASC"
        );
        sqlx::query_as::<_, Resource>(&query)
            .bind(ResourceLifetime::Temporary.id())
            .bind(now)
            .fetch_all(pool)
            .await
    }

    /// All resources sharing a group tag (e.g. one upload session).
    pub async fn list_by_group_tag(
        pool: &PgPool,
        group_tag: &str,
    ) -> Result<Vec<Resource>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM resources WHERE group_tag = $1");
        sqlx::query_as::<_, Resource>(&query)
            .bind(group_tag)
            .fetch_all(pool)
            .await
    }

    /// Every storage key known to the registry. Used by the orphan sweep
    /// to reconcile the blob store against the records.
    pub async fn all_storage_keys(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT storage_key FROM resources")
            .fetch_all(pool)
            .await
    }

    /// Take `FOR SHARE` locks on a set of resource rows inside the given
    /// transaction. Task creation holds these while inserting its rows so
    /// the sweeper's check-then-delete cannot interleave. Returns the ids
    /// that actually exist.
    pub async fn lock_shared<'e>(
        executor: impl PgExecutor<'e>,
        ids: &[DbId],
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM resources WHERE id = ANY($1) FOR SHARE")
            .bind(ids)
            .fetch_all(executor)
            .await
    }

    /// Delete a resource record unless a pending/running task references it
    /// (as a source photo, or through its template's original or masked
    /// image).
    ///
    /// The existence check, the reference count, and the delete run in one
    /// transaction with the resource row locked `FOR UPDATE`, so a task
    /// cannot begin using the resource between the check and the delete.
    /// Blob removal is the caller's responsibility after a `Deleted`
    /// outcome; a blob whose record is already gone is picked up by the
    /// orphan sweep.
    pub async fn delete_if_unreferenced(
        pool: &PgPool,
        id: DbId,
    ) -> Result<DeleteOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!("SELECT {COLUMNS} FROM resources WHERE id = $1 FOR UPDATE");
        let resource = sqlx::query_as::<_, Resource>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(resource) = resource else {
            return Ok(DeleteOutcome::NotFound);
        };

        let active_tasks: i64 = sqlx::query_scalar(ACTIVE_REFERENCE_QUERY)
            .bind(id)
            .bind(TaskStatus::Pending.id())
            .bind(TaskStatus::Running.id())
            .fetch_one(&mut *tx)
            .await?;

        if active_tasks > 0 {
            tx.rollback().await?;
            return Ok(DeleteOutcome::InUse { active_tasks });
        }

        sqlx::query("DELETE FROM resources WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(DeleteOutcome::Deleted(resource))
    }

    /// Count active task references without deleting. Used by dry runs.
    pub async fn count_active_references(
        pool: &PgPool,
        id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(ACTIVE_REFERENCE_QUERY)
            .bind(id)
            .bind(TaskStatus::Pending.id())
            .bind(TaskStatus::Running.id())
            .fetch_one(pool)
            .await
    }

    /// Count temporary resources, total and already expired at `now`.
    pub async fn count_temporary(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<(i64, i64), sqlx::Error> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
                    COUNT(*) FILTER (WHERE expires_at IS NOT NULL AND expires_at < $2) \
             FROM resources WHERE lifetime_id = $1",
        )
        .bind(ResourceLifetime::Temporary.id())
        .bind(now)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    /// Unconditional record delete, for artifacts that carry no active-use
    /// protection (stale results already detached from their task).
    pub async fn delete_record(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<Resource>, sqlx::Error> {
        let query = format!("DELETE FROM resources WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, Resource>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
