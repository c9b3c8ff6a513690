//! Embedded SQLite database: track store, move ledger, and API cache.
//!
//! One database file holds everything the pipeline persists. The schema
//! is versioned; migrations run at open. A single pool is shared by all
//! repositories, and SQLite serializes writers while readers stay
//! non-blocking (WAL mode).

pub mod cache;
pub mod ledger;
pub mod tracks;

pub use cache::{CacheEntry, CacheKind, ResponseCache};
pub use ledger::{MoveLedger, MoveRecord, OpKind, ReversalState};
pub use tracks::TrackStore;

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Open (creating if needed) the database and run migrations.
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::query("PRAGMA journal_mode=WAL")
        .execute(&pool)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;

    Ok(pool)
}

// A pooled ":memory:" database gives every connection its own empty
// database, so tests pin the pool to a single connection.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory db");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}
