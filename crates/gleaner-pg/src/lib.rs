//! gleaner-pg
//!
//! PostgreSQL (sqlx) implementations of the gleaner ports.
//!
//! - [`PgRecordStore`]: 正本 `parts_data`（URL で upsert、バッチは 1 トランザクション）
//! - [`PgStagingCache`]: `staged_results` / `failed_urls`（再起動をまたいで残る）
//!
//! スキーマは `migrations/` にあり、[`migrate`] で適用する。

mod records;
mod staging;

use std::time::Duration;

use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

pub use self::records::PgRecordStore;
pub use self::staging::PgStagingCache;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open a connection pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
}

/// Apply pending migrations. Safe to run on every start and from every worker.
pub async fn migrate(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await?;
    info!("database migrations applied");
    Ok(())
}
