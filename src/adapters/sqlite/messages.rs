use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::warn;

use super::{placeholders, DbPool, IN_CHUNK};
use crate::error::SmsError;
use crate::types::{MessageDirection, MessageRecord};

const SELECT_COLUMNS: &str = "SELECT id, thread_id, address, body, timestamp, is_read,
            direction, subscription_id, last_sync_timestamp
     FROM messages";

/// Insert or fully replace message rows in one transaction.
pub fn upsert_messages(pool: &DbPool, rows: &[MessageRecord]) -> Result<usize, SmsError> {
    let conn = pool.get()?;
    let tx = conn.unchecked_transaction()?;

    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO messages (
                id, thread_id, address, body, timestamp, is_read,
                direction, subscription_id, last_sync_timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;

        for row in rows {
            stmt.execute(params![
                row.id,
                row.thread_id,
                row.address,
                row.body,
                row.timestamp,
                row.is_read as i32,
                row.direction.as_str(),
                row.subscription_id,
                row.last_sync_timestamp,
            ])?;
        }
    }

    tx.commit()?;
    Ok(rows.len())
}

/// Messages of one thread, oldest first
pub fn fetch_thread_messages(pool: &DbPool, thread_id: i64) -> Result<Vec<MessageRecord>, SmsError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE thread_id = ?1 ORDER BY timestamp ASC, id ASC"
    ))?;

    let rows = stmt.query_map(params![thread_id], row_to_record)?;

    let mut messages = Vec::new();
    for row in rows {
        match row {
            Ok(Some(record)) => messages.push(record),
            Ok(None) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(messages)
}

pub fn get_message(pool: &DbPool, id: i64) -> Result<Option<MessageRecord>, SmsError> {
    let conn = pool.get()?;
    let result = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            params![id],
            row_to_record,
        )
        .optional()?;
    Ok(result.flatten())
}

/// Per-thread message watermark; 0 when the thread was never synced.
pub fn max_sync_timestamp_for_thread(pool: &DbPool, thread_id: i64) -> Result<i64, SmsError> {
    let conn = pool.get()?;
    let ts = conn.query_row(
        "SELECT COALESCE(MAX(last_sync_timestamp), 0) FROM messages WHERE thread_id = ?1",
        params![thread_id],
        |row| row.get(0),
    )?;
    Ok(ts)
}

pub fn count_messages(pool: &DbPool) -> Result<usize, SmsError> {
    let conn = pool.get()?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
    Ok(count as usize)
}

pub(super) fn thread_ids_for(conn: &Connection, ids: &[i64]) -> Result<Vec<i64>, SmsError> {
    let mut threads = Vec::new();
    for chunk in ids.chunks(IN_CHUNK) {
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT thread_id FROM messages WHERE id IN ({})",
            placeholders(chunk.len())
        ))?;
        let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get::<_, i64>(0))?;
        for row in rows {
            threads.push(row?);
        }
    }
    threads.sort_unstable();
    threads.dedup();
    Ok(threads)
}

pub(super) fn delete_in(conn: &Connection, ids: &[i64]) -> Result<usize, SmsError> {
    let mut deleted = 0;
    for chunk in ids.chunks(IN_CHUNK) {
        deleted += conn.execute(
            &format!("DELETE FROM messages WHERE id IN ({})", placeholders(chunk.len())),
            params_from_iter(chunk.iter()),
        )?;
    }
    Ok(deleted)
}

pub(super) fn delete_for_threads(conn: &Connection, thread_ids: &[i64]) -> Result<usize, SmsError> {
    let mut deleted = 0;
    for chunk in thread_ids.chunks(IN_CHUNK) {
        deleted += conn.execute(
            &format!(
                "DELETE FROM messages WHERE thread_id IN ({})",
                placeholders(chunk.len())
            ),
            params_from_iter(chunk.iter()),
        )?;
    }
    Ok(deleted)
}

// Rows with an unrecognised direction are skipped rather than failing the read.
fn row_to_record(row: &Row) -> Result<Option<MessageRecord>, rusqlite::Error> {
    let id: i64 = row.get(0)?;
    let direction: String = row.get(6)?;
    let Some(direction) = MessageDirection::parse(&direction) else {
        warn!(message_id = id, direction = %direction, "Skipping cached message with unknown direction");
        return Ok(None);
    };

    Ok(Some(MessageRecord {
        id,
        thread_id: row.get(1)?,
        address: row.get(2)?,
        body: row.get(3)?,
        timestamp: row.get(4)?,
        is_read: row.get::<_, i32>(5)? != 0,
        direction,
        subscription_id: row.get(7)?,
        last_sync_timestamp: row.get(8)?,
    }))
}
