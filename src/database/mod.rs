pub mod migrations;
pub mod migrator;
pub mod series;
pub mod store;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DbConfig;
use crate::domain::PriceArea;

pub use migrator::{Migration, MigrationError, SchemaMigrator};
pub use series::{SeriesKey, SeriesKind};
pub use store::TimeSeriesStore;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("unknown partition {0:?}")]
    UnknownPartition(String),
    #[error("series {kind} does not take partition {partition:?}")]
    PartitionMismatch {
        kind: SeriesKind,
        partition: Option<PriceArea>,
    },
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the SQLite database at `cfg.url`, creating the file if needed, and
/// bring its schema up to date.
///
/// Migration failures are returned as-is; the caller must not continue with an
/// unknown schema.
pub async fn open(cfg: &DbConfig) -> anyhow::Result<TimeSeriesStore> {
    info!(url = %cfg.url, "opening database");
    let options = SqliteConnectOptions::from_str(&cfg.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new()
        .max_connections(cfg.max_connections.max(1))
        .connect_with(options)
        .await?;
    migrate(&pool).await?;
    Ok(TimeSeriesStore::new(pool))
}

/// Migrated store on a private in-memory database.
pub async fn in_memory() -> Result<TimeSeriesStore, MigrationError> {
    let pool = memory_pool().await?;
    migrate(&pool).await?;
    Ok(TimeSeriesStore::new(pool))
}

/// In-memory databases live as long as their connection, so the pool is pinned
/// to one connection that is never recycled.
pub(crate) async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

async fn migrate(pool: &SqlitePool) -> Result<(), MigrationError> {
    let migrator = SchemaMigrator::new(pool.clone());
    migrator.init().await?;
    migrator.migrate(migrations::MIGRATIONS).await?;
    info!(version = migrator.version().await?, "database schema up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_file_database_twice() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DbConfig {
            url: format!("sqlite://{}", dir.path().join("ledger.db").display()),
            max_connections: 4,
        };

        let store = open(&cfg).await.unwrap();
        store.health_check().await.unwrap();
        store.pool().close().await;

        // second start must not re-run any step
        let store = open(&cfg).await.unwrap();
        let version = SchemaMigrator::new(store.pool().clone()).version().await.unwrap();
        assert_eq!(version, migrations::MIGRATIONS.len() as i64 - 1);
    }

    #[tokio::test]
    async fn test_in_memory_is_migrated() {
        let store = in_memory().await.unwrap();
        let migrator = SchemaMigrator::new(store.pool().clone());
        assert!(migrator.initialized().await.unwrap());
        assert_eq!(
            migrator.version().await.unwrap(),
            migrations::MIGRATIONS.len() as i64 - 1
        );
    }
}
