//! Forward-only schema migrations tracked by a single version counter
//!
//! The counter lives in `_migrator_` and records the index of the last
//! applied step, or `-1` when nothing has been applied yet. Every step runs in
//! its own transaction together with the counter update, so a failing step
//! leaves neither its statements nor a version bump behind.

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};

const VERSION_TABLE: &str = "_migrator_";

/// Version recorded before any step has been applied.
pub const UNMIGRATED: i64 = -1;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration bookkeeping failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration step {version} ({name}) failed: {source}")]
    Step {
        version: i64,
        name: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// One forward schema change. `sql` may hold several statements.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

impl Migration {
    pub const fn new(name: &'static str, sql: &'static str) -> Self {
        Self { name, sql }
    }
}

#[derive(Debug, Clone)]
pub struct SchemaMigrator {
    pool: SqlitePool,
}

impl SchemaMigrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Whether the version table exists.
    pub async fn initialized(&self) -> Result<bool, MigrationError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")
                .bind(VERSION_TABLE)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Create the version table if it does not exist yet.
    pub async fn init(&self) -> Result<(), MigrationError> {
        if self.initialized().await? {
            return Ok(());
        }
        debug!("creating migration version table");
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrator_ (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            ) STRICT",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn version(&self) -> Result<i64, MigrationError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM _migrator_ WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v).unwrap_or(UNMIGRATED))
    }

    pub async fn set_version(&self, version: i64) -> Result<(), MigrationError> {
        sqlx::query(SET_VERSION)
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Apply every step after the recorded version, in order. Creates the
    /// version table first if needed.
    pub async fn migrate(&self, steps: &[Migration]) -> Result<(), MigrationError> {
        self.init().await?;
        let current = self.version().await?;
        let next = usize::try_from(current + 1).unwrap_or(0);
        debug!(
            current_version = current,
            pending = steps.len().saturating_sub(next),
            "migration check"
        );

        for (index, step) in steps.iter().enumerate().skip(next) {
            let version = index as i64;
            info!(version, name = step.name, "applying migration");
            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(step.sql)
                .execute(&mut *tx)
                .await
                .map_err(|source| MigrationError::Step {
                    version,
                    name: step.name,
                    source,
                })?;
            sqlx::query(SET_VERSION)
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
        Ok(())
    }
}

const SET_VERSION: &str = "INSERT INTO _migrator_ (id, version) VALUES (1, ?1)
    ON CONFLICT (id) DO UPDATE SET version = excluded.version";
