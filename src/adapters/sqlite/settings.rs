use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::DbPool;
use crate::error::SmsError;

pub fn get_setting(pool: &DbPool, key: &str) -> Result<Option<String>, SmsError> {
    let conn = pool.get()?;
    let result = conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        params![key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(SmsError::Database(e.to_string())),
    }
}

/// Read-modify-write of one key inside an IMMEDIATE transaction.
///
/// Returns `(old, new)` so callers can tell whether anything changed.
pub fn update_setting<F>(
    pool: &DbPool,
    key: &str,
    transform: F,
) -> Result<(Option<String>, String), SmsError>
where
    F: FnOnce(Option<&str>) -> String,
{
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current: Option<String> = tx
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;

    let updated = transform(current.as_deref());

    if current.as_deref() != Some(updated.as_str()) {
        let now = chrono::Utc::now().timestamp_millis();
        tx.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, updated, now],
        )?;
    }

    tx.commit()?;
    Ok((current, updated))
}
