//! Database module

pub mod queries;
pub mod store;

#[cfg(test)]
pub mod memory;

pub use store::{CandidateSource, PgStore, RouteSink, RouteStore};

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Create a database connection pool.
///
/// Zone workers each hold a connection while fetching, so the pool should be
/// at least one larger than the worker count.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");

    let migrator = sqlx::migrate!("./migrations");

    let compiled_versions: Vec<i64> = migrator
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .map(|m| m.version)
        .collect();
    info!("Compiled migration versions: {:?}", compiled_versions);

    migrator.run(pool).await?;

    info!("Database migrations complete");
    Ok(())
}
