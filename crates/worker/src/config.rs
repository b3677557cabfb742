//! Worker configuration loaded from environment variables.

use std::time::Duration;

/// Runtime configuration for the worker process.
///
/// All fields except `database_url` have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Root directory of the local blob store (default: `./data`).
    pub storage_root: String,
    /// Base URL of the inference sidecar (default: `http://127.0.0.1:8500`).
    pub engine_url: String,
    /// Maximum number of tasks executing concurrently (default: `4`).
    pub max_concurrent_tasks: usize,
    /// Dispatcher/preprocessor polling interval (default: `1000` ms).
    pub poll_interval: Duration,
    /// Age after which terminal tasks lose their result artifact
    /// (default: `30` days).
    pub stale_result_age: chrono::Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                  |
    /// |------------------------|--------------------------|
    /// | `DATABASE_URL`         | (required)               |
    /// | `STORAGE_ROOT`         | `./data`                 |
    /// | `ENGINE_URL`           | `http://127.0.0.1:8500`  |
    /// | `MAX_CONCURRENT_TASKS` | `4`                      |
    /// | `POLL_INTERVAL_MS`     | `1000`                   |
    /// | `STALE_RESULT_DAYS`    | `30`                     |
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let storage_root = std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "./data".into());

        let engine_url =
            std::env::var("ENGINE_URL").unwrap_or_else(|_| "http://127.0.0.1:8500".into());

        let max_concurrent_tasks: usize = env_parsed("MAX_CONCURRENT_TASKS", 4)?;
        let poll_interval_ms: u64 = env_parsed("POLL_INTERVAL_MS", 1000)?;
        let stale_result_days: i64 = env_parsed("STALE_RESULT_DAYS", 30)?;

        Ok(Self {
            database_url,
            storage_root,
            engine_url,
            max_concurrent_tasks,
            poll_interval: Duration::from_millis(poll_interval_ms),
            stale_result_age: chrono::Duration::days(stale_result_days),
        })
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{name} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
