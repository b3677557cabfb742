//! Repository for the `tasks` table.
//!
//! Uses `TaskStatus` from `models::status` for all transitions. Pickup
//! goes through `SELECT FOR UPDATE SKIP LOCKED` so concurrent dispatchers
//! never double-claim, and every transition is a single UPDATE — a status
//! read can never observe a task mid-transition.

use faceforge_core::types::DbId;
use sqlx::{PgExecutor, PgPool};

use crate::models::status::{StatusId, TaskStatus};
use crate::models::task::{NewTask, Task};

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, uid, batch_id, first_photo_id, second_photo_id, template_id, \
    mapping, status_id, progress_percent, cancel_requested, \
    result_resource_id, error_detail, created_at, started_at, completed_at";

/// Default page size for task listing.
const DEFAULT_LIMIT: i64 = 50;

/// Maximum page size for task listing.
const MAX_LIMIT: i64 = 100;

/// Provides CRUD operations for swap tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a new pending task. Accepts any executor so batch creation
    /// can run it inside its all-or-nothing transaction.
    pub async fn insert<'e>(
        executor: impl PgExecutor<'e>,
        input: &NewTask,
    ) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks \
                 (uid, batch_id, first_photo_id, second_photo_id, template_id, \
                  mapping, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(&input.uid)
            .bind(input.batch_id)
            .bind(input.first_photo_id)
            .bind(input.second_photo_id)
            .bind(input.template_id)
            .bind(&input.mapping)
            .bind(TaskStatus::Pending.id())
            .fetch_one(executor)
            .await
    }

    /// Atomically claim the oldest pending task for execution.
    ///
    /// Sets `Running` and `started_at` in the same statement. Tasks whose
    /// cancellation was requested while still pending are not claimable;
    /// [`TaskRepo::cancel_abandoned_pending`] retires them instead.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks \
             SET status_id = $1, started_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM tasks \
                 WHERE status_id = $2 AND cancel_requested = FALSE \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Running.id())
            .bind(TaskStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a task by its externally visible uid.
    pub async fn find_by_uid(pool: &PgPool, uid: &str) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE uid = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(uid)
            .fetch_optional(pool)
            .await
    }

    /// All tasks of a batch in creation order.
    pub async fn list_by_batch(pool: &PgPool, batch_id: DbId) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks WHERE batch_id = $1 ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(batch_id)
            .fetch_all(pool)
            .await
    }

    /// Status ids of a batch's children. The batch aggregate is computed
    /// from this scan, never from stored counters.
    pub async fn states_for_batch(
        pool: &PgPool,
        batch_id: DbId,
    ) -> Result<Vec<StatusId>, sqlx::Error> {
        sqlx::query_scalar("SELECT status_id FROM tasks WHERE batch_id = $1")
            .bind(batch_id)
            .fetch_all(pool)
            .await
    }

    /// List standalone and batch tasks, newest first.
    pub async fn list(
        pool: &PgPool,
        status_id: Option<StatusId>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = offset.unwrap_or(0);
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE ($1::SMALLINT IS NULL OR status_id = $1) \
             ORDER BY created_at DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(status_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Update progress for a running task.
    pub async fn update_progress(
        pool: &PgPool,
        id: DbId,
        percent: i16,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasks SET progress_percent = $2 WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(percent)
        .bind(TaskStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a running task completed with its result resource.
    ///
    /// Progress lands at exactly 100.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        result_resource_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, result_resource_id = $3, progress_percent = 100, \
                 completed_at = NOW() \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(TaskStatus::Completed.id())
        .bind(result_resource_id)
        .bind(TaskStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a running task failed with a human-readable reason.
    ///
    /// No automatic retry exists; the task stays failed until a caller
    /// creates a new one.
    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, error_detail = $3, completed_at = NOW() \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(TaskStatus::Failed.id())
        .bind(error)
        .bind(TaskStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Request cancellation of a single task.
    ///
    /// Pending tasks cancel immediately; running tasks get the flag and
    /// cancel themselves at the next executor checkpoint. Terminal tasks
    /// are untouched. Returns `true` if anything changed.
    pub async fn request_cancel(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks \
             SET cancel_requested = TRUE, \
                 status_id = CASE WHEN status_id = $2 THEN $3 ELSE status_id END, \
                 completed_at = CASE WHEN status_id = $2 THEN NOW() ELSE completed_at END \
             WHERE id = $1 AND status_id IN ($2, $4)",
        )
        .bind(id)
        .bind(TaskStatus::Pending.id())
        .bind(TaskStatus::Canceled.id())
        .bind(TaskStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Request cancellation for every non-terminal child of a batch.
    ///
    /// Returns the number of tasks touched.
    pub async fn request_cancel_for_batch(
        pool: &PgPool,
        batch_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks \
             SET cancel_requested = TRUE, \
                 status_id = CASE WHEN status_id = $2 THEN $3 ELSE status_id END, \
                 completed_at = CASE WHEN status_id = $2 THEN NOW() ELSE completed_at END \
             WHERE batch_id = $1 AND status_id IN ($2, $4)",
        )
        .bind(batch_id)
        .bind(TaskStatus::Pending.id())
        .bind(TaskStatus::Canceled.id())
        .bind(TaskStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Retire pending tasks whose cancellation was requested before any
    /// dispatcher claimed them.
    pub async fn cancel_abandoned_pending(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks \
             SET status_id = $1, completed_at = NOW() \
             WHERE status_id = $2 AND cancel_requested = TRUE",
        )
        .bind(TaskStatus::Canceled.id())
        .bind(TaskStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Transition a running task to canceled after an executor checkpoint
    /// observed the cancellation flag.
    pub async fn mark_canceled(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, completed_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(TaskStatus::Canceled.id())
        .bind(TaskStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Checkpoint read: has cancellation been requested for this task?
    pub async fn is_cancel_requested(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let flag: Option<bool> =
            sqlx::query_scalar("SELECT cancel_requested FROM tasks WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        Ok(flag.unwrap_or(false))
    }

    /// Completed tasks of a batch in creation order, for result collection.
    pub async fn completed_for_batch(
        pool: &PgPool,
        batch_id: DbId,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE batch_id = $1 AND status_id = $2 AND result_resource_id IS NOT NULL \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(batch_id)
            .bind(TaskStatus::Completed.id())
            .fetch_all(pool)
            .await
    }

    /// Terminal tasks older than `cutoff` that still hold a result
    /// resource. Candidates for the stale-result sweep.
    pub async fn find_stale_results(
        pool: &PgPool,
        cutoff: faceforge_core::types::Timestamp,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE status_id IN ($1, $2) \
               AND completed_at IS NOT NULL AND completed_at < $3 \
               AND result_resource_id IS NOT NULL \
             ORDER BY completed_at ASC"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Completed.id())
            .bind(TaskStatus::Failed.id())
            .bind(cutoff)
            .fetch_all(pool)
            .await
    }

    /// Count terminal tasks older than `cutoff` still holding a result.
    pub async fn count_stale_results(
        pool: &PgPool,
        cutoff: faceforge_core::types::Timestamp,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks \
             WHERE status_id IN ($1, $2) \
               AND completed_at IS NOT NULL AND completed_at < $3 \
               AND result_resource_id IS NOT NULL",
        )
        .bind(TaskStatus::Completed.id())
        .bind(TaskStatus::Failed.id())
        .bind(cutoff)
        .fetch_one(pool)
        .await
    }

    /// Detach a task's result resource after the sweep deleted it. The
    /// task row itself is history and is never deleted.
    pub async fn clear_result(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE tasks SET result_resource_id = NULL WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
