//! Task dispatcher.
//!
//! Polls for pending tasks and fans them out to the executor across a
//! bounded worker pool. Pickup uses `SELECT FOR UPDATE SKIP LOCKED` via
//! [`TaskRepo::claim_next`], so several dispatcher instances can run
//! against the same database without double-claiming.

use std::sync::Arc;
use std::time::Duration;

use faceforge_db::repositories::TaskRepo;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::executor::TaskExecutor;

/// Default polling interval for the dispatch loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of tasks executing concurrently.
const DEFAULT_MAX_CONCURRENT_TASKS: usize = 4;

/// Background task dispatcher.
pub struct TaskDispatcher {
    pool: PgPool,
    executor: Arc<TaskExecutor>,
    poll_interval: Duration,
    slots: Arc<Semaphore>,
}

impl TaskDispatcher {
    pub fn new(pool: PgPool, executor: Arc<TaskExecutor>) -> Self {
        Self::with_limits(
            pool,
            executor,
            DEFAULT_POLL_INTERVAL,
            DEFAULT_MAX_CONCURRENT_TASKS,
        )
    }

    pub fn with_limits(
        pool: PgPool,
        executor: Arc<TaskExecutor>,
        poll_interval: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            pool,
            executor,
            poll_interval,
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Run the dispatch loop until the cancellation token is triggered.
    ///
    /// In-flight tasks keep running through shutdown; they are sequential
    /// units of work and finish (or fail) on their own.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            max_concurrent = self.slots.available_permits(),
            "Task dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Task dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.cycle().await {
                        tracing::error!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }
    }

    /// One dispatch cycle: retire canceled pending tasks, then claim work
    /// while free slots remain.
    async fn cycle(&self) -> Result<(), sqlx::Error> {
        let retired = TaskRepo::cancel_abandoned_pending(&self.pool).await?;
        if retired > 0 {
            tracing::debug!(retired, "Retired canceled pending tasks");
        }

        loop {
            let Ok(permit) = self.slots.clone().try_acquire_owned() else {
                break; // pool saturated; next tick will pick up the rest
            };

            match TaskRepo::claim_next(&self.pool).await? {
                Some(task) => {
                    tracing::info!(
                        task_uid = %task.uid,
                        batch_id = task.batch_id,
                        "Task claimed",
                    );
                    let executor = Arc::clone(&self.executor);
                    tokio::spawn(async move {
                        executor.execute(&task).await;
                        drop(permit);
                    });
                }
                None => {
                    drop(permit);
                    break;
                }
            }
        }

        Ok(())
    }
}
