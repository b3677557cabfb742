//! Worker process wiring: configuration plus the background loop set.

pub mod config;

use std::sync::Arc;

use faceforge_core::clock::SystemClock;
use faceforge_engine::http::RemoteEngine;
use faceforge_pipeline::dispatcher::TaskDispatcher;
use faceforge_pipeline::executor::TaskExecutor;
use faceforge_pipeline::preprocess::Preprocessor;
use faceforge_pipeline::registry::ResourceRegistry;
use faceforge_pipeline::sweeper::Sweeper;
use faceforge_store::local::LocalBlobStore;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

/// Build every background loop and run them until `cancel` triggers.
pub async fn run(config: WorkerConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let pool = faceforge_db::connect(&config.database_url).await?;
    tracing::info!("Database connected, migrations applied");

    let store = Arc::new(LocalBlobStore::new(config.storage_root.clone()));
    let registry = Arc::new(ResourceRegistry::new(pool.clone(), store.clone()));

    let engine = Arc::new(RemoteEngine::new(config.engine_url.clone()));

    let executor = Arc::new(TaskExecutor::new(
        pool.clone(),
        registry.clone(),
        engine.clone(),
        engine.clone(),
    ));
    let dispatcher = TaskDispatcher::with_limits(
        pool.clone(),
        executor,
        config.poll_interval,
        config.max_concurrent_tasks,
    );
    let preprocessor = Preprocessor::new(pool.clone(), registry.clone(), engine);
    let sweeper = Sweeper::new(pool, store, Arc::new(SystemClock));

    let stale_age = config.stale_result_age;
    let dispatch_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.run(cancel).await })
    };
    let preprocess_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { preprocessor.run(cancel).await })
    };
    let sweep_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { sweeper.run(cancel, stale_age).await })
    };

    let _ = tokio::join!(dispatch_handle, preprocess_handle, sweep_handle);
    Ok(())
}
