//! Postgres persistence layer.
//!
//! Models are plain `FromRow` structs; repositories are zero-sized structs
//! providing async CRUD methods that take an executor as the first
//! argument. Status columns map to SMALLINT lookup tables via the enums in
//! [`models::status`].

pub mod models;
pub mod repositories;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Default connection pool size.
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Connect to Postgres and run pending migrations.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
