//! Batch orchestration.
//!
//! Fans one source pair across many templates, one task per unique
//! template. Creation is all-or-nothing: every referenced entity is
//! validated and every mapping resolved before a single row is written,
//! then the batch and all of its tasks land in one transaction. Status is
//! always recomputed from the child task rows.

use faceforge_core::batch::{
    dedupe_preserving_order, derive_batch_state, progress_percentage, TaskStateCounts,
};
use faceforge_core::error::CoreError;
use faceforge_core::mapping::{resolve, MappingSpec, ResolvedMapping};
use faceforge_core::types::{new_batch_uid, new_task_uid, DbId, Timestamp};
use faceforge_db::models::status::TaskStatus;
use faceforge_db::models::{Batch, NewBatch, NewTask, Resource, Task, Template};
use faceforge_db::repositories::{BatchRepo, ResourceRepo, TaskRepo, TemplateRepo};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::PipelineError;

/// Aggregate view of a batch, derived from its children on every read.
#[derive(Debug, Serialize)]
pub struct BatchStatusView {
    pub uid: String,
    pub state: String,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub failed_tasks: u32,
    pub canceled_tasks: u32,
    pub progress_percentage: f64,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// One completed result: which template it came from and the resource
/// holding the image.
#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub task_uid: String,
    pub template_id: DbId,
    pub resource: Resource,
}

/// Batch and standalone-task orchestrator.
pub struct BatchOrchestrator {
    pool: PgPool,
}

impl BatchOrchestrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a batch: one task per unique template, all-or-nothing.
    ///
    /// Duplicate template ids collapse silently, preserving first-
    /// occurrence order. Any missing entity or unresolvable mapping
    /// aborts the whole creation with zero rows written.
    pub async fn create(
        &self,
        first_photo_id: DbId,
        second_photo_id: DbId,
        template_ids: &[DbId],
        spec: &MappingSpec,
    ) -> Result<Batch, PipelineError> {
        if template_ids.is_empty() {
            return Err(CoreError::Validation("template_ids must not be empty".into()).into());
        }
        let unique_ids = dedupe_preserving_order(template_ids);
        let duplicates = template_ids.len() - unique_ids.len();
        if duplicates > 0 {
            tracing::debug!(duplicates, "Collapsed duplicate template ids");
        }

        let prepared = self
            .validate_and_resolve(first_photo_id, second_photo_id, &unique_ids, spec)
            .await?;

        // Everything is resolved; now write the batch and its tasks in one
        // transaction, holding shared locks on the referenced resources so
        // the sweeper's check-then-delete cannot interleave.
        let mut tx = self.pool.begin().await?;
        let mut lock_ids = vec![first_photo_id, second_photo_id];
        for (template, _) in &prepared {
            lock_ids.push(template.original_resource_id);
            lock_ids.extend(template.masked_resource_id);
        }
        ResourceRepo::lock_shared(&mut *tx, &lock_ids).await?;

        let batch = BatchRepo::insert(
            &mut *tx,
            &NewBatch {
                uid: new_batch_uid(),
                first_photo_id,
                second_photo_id,
                template_ids: unique_ids.clone(),
                total_tasks: prepared.len() as i32,
            },
        )
        .await?;

        for (template, mapping) in &prepared {
            TaskRepo::insert(
                &mut *tx,
                &NewTask {
                    uid: new_task_uid(),
                    batch_id: Some(batch.id),
                    first_photo_id,
                    second_photo_id,
                    template_id: template.id,
                    mapping: serde_json::to_value(mapping)
                        .map_err(|e| CoreError::Internal(e.to_string()))?,
                },
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            batch_uid = %batch.uid,
            tasks = prepared.len(),
            "Batch created",
        );
        Ok(batch)
    }

    /// Create a standalone task — conceptually a batch of one, without
    /// the batch row.
    pub async fn create_task(
        &self,
        first_photo_id: DbId,
        second_photo_id: DbId,
        template_id: DbId,
        spec: &MappingSpec,
    ) -> Result<Task, PipelineError> {
        let prepared = self
            .validate_and_resolve(first_photo_id, second_photo_id, &[template_id], spec)
            .await?;
        let (template, mapping) = &prepared[0];

        let mut tx = self.pool.begin().await?;
        let mut lock_ids = vec![first_photo_id, second_photo_id, template.original_resource_id];
        lock_ids.extend(template.masked_resource_id);
        ResourceRepo::lock_shared(&mut *tx, &lock_ids).await?;

        let task = TaskRepo::insert(
            &mut *tx,
            &NewTask {
                uid: new_task_uid(),
                batch_id: None,
                first_photo_id,
                second_photo_id,
                template_id: template.id,
                mapping: serde_json::to_value(mapping)
                    .map_err(|e| CoreError::Internal(e.to_string()))?,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(task_uid = %task.uid, template_id, "Standalone task created");
        Ok(task)
    }

    /// Recompute a batch's aggregate status from its children.
    ///
    /// The completed/failed counters come from a scan of the child rows,
    /// never from stored counters, so they cannot drift.
    pub async fn status(&self, batch_uid: &str) -> Result<BatchStatusView, PipelineError> {
        let batch = self.find_batch(batch_uid).await?;
        let counts = self.child_counts(batch.id).await?;
        let state = derive_batch_state(&counts);

        let completed_at = if counts.all_terminal() && counts.total > 0 {
            BatchRepo::stamp_completed(&self.pool, batch.id).await?;
            BatchRepo::find_by_id(&self.pool, batch.id)
                .await?
                .and_then(|b| b.completed_at)
        } else {
            batch.completed_at
        };

        Ok(BatchStatusView {
            uid: batch.uid,
            state: state.label().to_string(),
            total_tasks: counts.total,
            completed_tasks: counts.completed,
            failed_tasks: counts.failed,
            canceled_tasks: counts.canceled,
            progress_percentage: progress_percentage(&counts),
            created_at: batch.created_at,
            completed_at,
        })
    }

    /// All child tasks in creation order.
    pub async fn tasks(&self, batch_uid: &str) -> Result<Vec<Task>, PipelineError> {
        let batch = self.find_batch(batch_uid).await?;
        Ok(TaskRepo::list_by_batch(&self.pool, batch.id).await?)
    }

    /// Request cancellation on every non-terminal child.
    ///
    /// Pending children cancel immediately; running children observe the
    /// flag at their next checkpoint. Returns the number of tasks
    /// touched; the caller polls `status` to see actual termination.
    pub async fn cancel(&self, batch_uid: &str) -> Result<u64, PipelineError> {
        let batch = self.find_batch(batch_uid).await?;
        let touched = TaskRepo::request_cancel_for_batch(&self.pool, batch.id).await?;
        tracing::info!(batch_uid, touched, "Batch cancellation requested");
        Ok(touched)
    }

    /// Completed results in the batch's template order. Results whose
    /// artifact was already reclaimed are absent.
    pub async fn collect_results(
        &self,
        batch_uid: &str,
    ) -> Result<Vec<BatchResult>, PipelineError> {
        let batch = self.find_batch(batch_uid).await?;
        let tasks = TaskRepo::completed_for_batch(&self.pool, batch.id).await?;

        let resource_ids: Vec<DbId> = tasks.iter().filter_map(|t| t.result_resource_id).collect();
        let resources = ResourceRepo::find_by_ids(&self.pool, &resource_ids).await?;

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            let Some(result_id) = task.result_resource_id else {
                continue;
            };
            if let Some(resource) = resources.iter().find(|r| r.id == result_id) {
                results.push(BatchResult {
                    task_uid: task.uid,
                    template_id: task.template_id,
                    resource: resource.clone(),
                });
            }
        }
        Ok(results)
    }

    /// List batches, newest first, each with a freshly derived status.
    pub async fn list(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<BatchStatusView>, PipelineError> {
        let batches = BatchRepo::list(&self.pool, limit, offset).await?;
        let mut views = Vec::with_capacity(batches.len());
        for batch in batches {
            views.push(self.status(&batch.uid).await?);
        }
        Ok(views)
    }

    /// Standalone task status by uid.
    pub async fn task_status(&self, task_uid: &str) -> Result<Task, PipelineError> {
        TaskRepo::find_by_uid(&self.pool, task_uid)
            .await?
            .ok_or_else(|| {
                PipelineError::from(CoreError::NotFoundUid {
                    entity: "task",
                    uid: task_uid.to_string(),
                })
            })
    }

    /// Request cancellation of a single task.
    pub async fn cancel_task(&self, task_uid: &str) -> Result<bool, PipelineError> {
        let task = self.task_status(task_uid).await?;
        Ok(TaskRepo::request_cancel(&self.pool, task.id).await?)
    }

    // ---- internals ----

    /// Validate the source pair and every template, and resolve one
    /// mapping per template. No rows are written here; any failure means
    /// zero tasks get created.
    async fn validate_and_resolve(
        &self,
        first_photo_id: DbId,
        second_photo_id: DbId,
        template_ids: &[DbId],
        spec: &MappingSpec,
    ) -> Result<Vec<(Template, ResolvedMapping)>, PipelineError> {
        let photo_ids = [first_photo_id, second_photo_id];
        let photos = ResourceRepo::find_by_ids(&self.pool, &photo_ids).await?;
        let missing_photos: Vec<DbId> = photo_ids
            .iter()
            .copied()
            .filter(|id| !photos.iter().any(|p| p.id == *id))
            .collect();
        if !missing_photos.is_empty() {
            return Err(CoreError::NotFoundMany {
                entity: "resource",
                ids: missing_photos,
            }
            .into());
        }

        let templates = TemplateRepo::find_by_ids(&self.pool, template_ids).await?;
        let missing_templates: Vec<DbId> = template_ids
            .iter()
            .copied()
            .filter(|id| !templates.iter().any(|t| t.id == *id))
            .collect();
        if !missing_templates.is_empty() {
            return Err(CoreError::NotFoundMany {
                entity: "template",
                ids: missing_templates,
            }
            .into());
        }

        // find_by_ids has no order guarantee; restore the request order.
        let mut prepared = Vec::with_capacity(template_ids.len());
        for id in template_ids {
            let template = templates
                .iter()
                .find(|t| t.id == *id)
                .expect("presence checked above")
                .clone();
            let faces = template
                .face_observations()
                .map_err(|e| CoreError::Internal(format!("template {id} faces unreadable: {e}")))?;
            let mapping = resolve(&faces, template.is_preprocessed(), spec)
                .map_err(|e| CoreError::Validation(format!("template {id}: {e}")))?;
            prepared.push((template, mapping));
        }
        Ok(prepared)
    }

    async fn find_batch(&self, batch_uid: &str) -> Result<Batch, PipelineError> {
        BatchRepo::find_by_uid(&self.pool, batch_uid)
            .await?
            .ok_or_else(|| {
                PipelineError::from(CoreError::NotFoundUid {
                    entity: "batch",
                    uid: batch_uid.to_string(),
                })
            })
    }

    async fn child_counts(&self, batch_id: DbId) -> Result<TaskStateCounts, PipelineError> {
        let status_ids = TaskRepo::states_for_batch(&self.pool, batch_id).await?;
        let states: Vec<_> = status_ids
            .into_iter()
            .filter_map(TaskStatus::try_from_id)
            .map(TaskStatus::as_state)
            .collect();
        Ok(TaskStateCounts::from_states(&states))
    }
}
