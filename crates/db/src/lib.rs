//! SQLite persistence layer: pool bootstrap, embedded migrations, row
//! models, and repositories.
//!
//! Task and daily-usage records must survive process restart, so both live
//! here rather than in memory. The write-side invariants — forward-only
//! task status transitions and lost-update-free quota charges — are
//! enforced at the SQL statement level (guarded `UPDATE`s and a single
//! upsert increment), not by application-side read-then-write.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub mod models;
pub mod repositories;

/// Database connection pool.
pub type DbPool = sqlx::SqlitePool;

/// Open (creating if missing) the SQLite database behind `url`.
///
/// WAL journaling lets the dispatcher's background writes proceed alongside
/// request-path reads; the busy timeout covers the writer lock handoff.
pub async fn create_pool(url: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;
    tracing::debug!(url, "Database pool created");
    Ok(pool)
}

/// Cheap connectivity probe used at startup and by the health endpoint.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply embedded migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
