use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use crate::error::SmsError;

// Shorthand so callers don't have to spell out the full pool type.
pub type DbPool = Pool<SqliteConnectionManager>;

pub fn create_pool(db_path: &Path) -> Result<DbPool, SmsError> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA temp_store = MEMORY;",
        )
    });

    let pool = Pool::builder().max_size(8).build(manager)?;

    // journal_mode is persistent for file databases, set it once
    let conn = pool.get()?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA cache_size = -8000;",
    )?;

    Ok(pool)
}

/// Single-connection in-memory pool (for testing)
///
/// The database lives as long as its one connection, so the pool must
/// never recycle it.
pub fn create_memory_pool() -> Result<DbPool, SmsError> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(manager)?;
    Ok(pool)
}
