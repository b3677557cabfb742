//! Retention/cleanup sweeper.
//!
//! Reclaims expired temporary resources, stale result artifacts, orphaned
//! blobs, and whole upload groups. Every sweep returns a
//! [`SweepReport`], continues past individual failures, and supports a
//! dry-run mode that computes the same report without touching storage.
//! Task history is never deleted — only the heavy artifacts.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use faceforge_core::clock::Clock;
use faceforge_core::retention::SweepReport;
use faceforge_core::types::Timestamp;
use faceforge_db::models::Resource;
use faceforge_db::repositories::{DeleteOutcome, ResourceRepo, TaskRepo};
use faceforge_store::{BlobStore, StoreError};
use serde::Serialize;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// How often the background sweep loop runs.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Default age after which terminal tasks lose their result artifact.
pub const DEFAULT_STALE_RESULT_AGE: chrono::Duration = chrono::Duration::days(30);

/// Read-only preview of what the sweeps could reclaim.
#[derive(Debug, Serialize)]
pub struct CleanupStats {
    pub temporary_resources: i64,
    pub expired_temporary_resources: i64,
    pub stale_results: i64,
    pub checked_at: Timestamp,
}

/// Storage reclamation over the registry, the task table, and the blob
/// store.
pub struct Sweeper {
    pool: PgPool,
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
}

impl Sweeper {
    pub fn new(pool: PgPool, store: Arc<dyn BlobStore>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, store, clock }
    }

    /// Delete expired temporary resources that no pending/running task
    /// references. Protected resources are skipped and left for a later
    /// sweep.
    pub async fn sweep_expired_temporary(
        &self,
        dry_run: bool,
    ) -> Result<SweepReport, PipelineError> {
        let now = self.clock.now();
        let candidates = ResourceRepo::find_expired_temporary(&self.pool, now).await?;
        tracing::info!(
            candidates = candidates.len(),
            dry_run,
            "Sweeping expired temporary resources",
        );

        let mut report = SweepReport::new(dry_run);
        for resource in candidates {
            self.reclaim_resource(&resource, dry_run, &mut report).await;
        }
        Ok(report)
    }

    /// Delete every resource in an upload group (e.g. an ended user
    /// session), with the same active-use protection per item.
    pub async fn sweep_group(
        &self,
        group_tag: &str,
        dry_run: bool,
    ) -> Result<SweepReport, PipelineError> {
        let members = ResourceRepo::list_by_group_tag(&self.pool, group_tag).await?;
        tracing::info!(
            group_tag,
            members = members.len(),
            dry_run,
            "Sweeping resource group",
        );

        let mut report = SweepReport::new(dry_run);
        for resource in members {
            self.reclaim_resource(&resource, dry_run, &mut report).await;
        }
        Ok(report)
    }

    /// Delete result artifacts of terminal tasks older than `older_than`.
    /// The task records stay — history is never deleted, only the image.
    pub async fn sweep_stale_results(
        &self,
        older_than: chrono::Duration,
        dry_run: bool,
    ) -> Result<SweepReport, PipelineError> {
        let cutoff = self.clock.now() - older_than;
        let stale = TaskRepo::find_stale_results(&self.pool, cutoff).await?;
        tracing::info!(stale = stale.len(), dry_run, "Sweeping stale task results");

        let mut report = SweepReport::new(dry_run);
        for task in stale {
            let Some(result_id) = task.result_resource_id else {
                continue;
            };

            if dry_run {
                match ResourceRepo::find_by_id(&self.pool, result_id).await {
                    Ok(Some(resource)) => report.record_deleted(resource.byte_size),
                    Ok(None) => {}
                    Err(e) => report.record_error(result_id, e.to_string()),
                }
                continue;
            }

            match ResourceRepo::delete_record(&self.pool, result_id).await {
                Ok(Some(resource)) => {
                    self.delete_blob_tolerant(&resource, &mut report).await;
                    if let Err(e) = TaskRepo::clear_result(&self.pool, task.id).await {
                        report.record_error(result_id, format!("result detach failed: {e}"));
                    }
                    report.record_deleted(resource.byte_size);
                }
                Ok(None) => {
                    // Record already gone; just drop the dangling pointer.
                    if let Err(e) = TaskRepo::clear_result(&self.pool, task.id).await {
                        report.record_error(result_id, format!("result detach failed: {e}"));
                    }
                }
                Err(e) => report.record_error(result_id, e.to_string()),
            }
        }
        Ok(report)
    }

    /// Reconcile the blob store against the registry: delete blobs whose
    /// key has no matching resource record.
    pub async fn sweep_orphans(&self, dry_run: bool) -> Result<SweepReport, PipelineError> {
        let stored_keys = self.store.list_keys().await?;
        let known: HashSet<String> = ResourceRepo::all_storage_keys(&self.pool)
            .await?
            .into_iter()
            .collect();

        let mut report = SweepReport::new(dry_run);
        for key in stored_keys {
            if known.contains(&key) {
                continue;
            }
            let bytes = self.store.size_of(&key).await.unwrap_or(0);
            if dry_run {
                report.record_deleted(bytes);
                continue;
            }
            match self.store.delete(&key).await {
                Ok(()) => report.record_deleted(bytes),
                Err(StoreError::NotFound(_)) => {}
                Err(e) => report.record_error(&key, e.to_string()),
            }
        }

        tracing::info!(
            deleted = report.deleted_count,
            errors = report.errors.len(),
            dry_run,
            "Orphan sweep finished",
        );
        Ok(report)
    }

    /// Counts of what the sweeps could reclaim right now.
    pub async fn stats(&self) -> Result<CleanupStats, PipelineError> {
        let now = self.clock.now();
        let (temporary, expired) = ResourceRepo::count_temporary(&self.pool, now).await?;
        let stale =
            TaskRepo::count_stale_results(&self.pool, now - DEFAULT_STALE_RESULT_AGE).await?;
        Ok(CleanupStats {
            temporary_resources: temporary,
            expired_temporary_resources: expired,
            stale_results: stale,
            checked_at: now,
        })
    }

    /// Run the periodic sweep loop until cancelled: expired temporaries
    /// plus stale results on every tick.
    pub async fn run(&self, cancel: CancellationToken, stale_after: chrono::Duration) {
        let mut ticker = tokio::time::interval(DEFAULT_SWEEP_INTERVAL);
        tracing::info!(
            interval_secs = DEFAULT_SWEEP_INTERVAL.as_secs(),
            "Retention sweeper started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Retention sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep_expired_temporary(false).await {
                        Ok(report) => log_report("expired_temporary", &report),
                        Err(e) => tracing::error!(error = %e, "Expired-temporary sweep failed"),
                    }
                    match self.sweep_stale_results(stale_after, false).await {
                        Ok(report) => log_report("stale_results", &report),
                        Err(e) => tracing::error!(error = %e, "Stale-result sweep failed"),
                    }
                }
            }
        }
    }

    // ---- internals ----

    /// Reclaim one resource with active-use protection, folding the
    /// outcome into `report`.
    async fn reclaim_resource(&self, resource: &Resource, dry_run: bool, report: &mut SweepReport) {
        if dry_run {
            match ResourceRepo::count_active_references(&self.pool, resource.id).await {
                Ok(0) => report.record_deleted(resource.byte_size),
                Ok(_) => {} // in use; a later sweep will retry
                Err(e) => report.record_error(resource.id, e.to_string()),
            }
            return;
        }

        match ResourceRepo::delete_if_unreferenced(&self.pool, resource.id).await {
            Ok(DeleteOutcome::Deleted(deleted)) => {
                self.delete_blob_tolerant(&deleted, report).await;
                report.record_deleted(deleted.byte_size);
            }
            Ok(DeleteOutcome::InUse { active_tasks }) => {
                tracing::debug!(
                    resource_id = resource.id,
                    active_tasks,
                    "Skipping in-use resource",
                );
            }
            Ok(DeleteOutcome::NotFound) => {} // raced another sweep
            Err(e) => report.record_error(resource.id, e.to_string()),
        }
    }

    /// Remove a blob whose record is already gone. A missing blob is
    /// fine; anything else is reported but leaves the sweep running (the
    /// orphan sweep will retry the blob).
    async fn delete_blob_tolerant(&self, resource: &Resource, report: &mut SweepReport) {
        match self.store.delete(&resource.storage_key).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => {
                report.record_error(resource.id, format!("blob delete failed: {e}"));
            }
        }
    }
}

fn log_report(sweep: &str, report: &SweepReport) {
    if report.deleted_count > 0 || !report.errors.is_empty() {
        tracing::info!(
            sweep,
            deleted = report.deleted_count,
            reclaimed = %faceforge_core::retention::format_bytes(report.reclaimed_bytes),
            errors = report.errors.len(),
            "Sweep finished",
        );
    } else {
        tracing::debug!(sweep, "Sweep found nothing to reclaim");
    }
}
