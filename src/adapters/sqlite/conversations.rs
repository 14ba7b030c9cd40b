use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{placeholders, DbPool, IN_CHUNK};
use crate::error::SmsError;
use crate::types::ConversationSummary;

const SELECT_COLUMNS: &str = "SELECT thread_id, address, snippet, last_message_timestamp, is_read,
            resolved_sender_name, last_sync_timestamp
     FROM conversations";

/// Insert or fully replace conversation rows in one transaction.
pub fn upsert_conversations(
    pool: &DbPool,
    rows: &[ConversationSummary],
) -> Result<usize, SmsError> {
    let conn = pool.get()?;
    let tx = conn.unchecked_transaction()?;

    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO conversations (
                thread_id, address, snippet, last_message_timestamp, is_read,
                resolved_sender_name, last_sync_timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;

        for row in rows {
            stmt.execute(params![
                row.thread_id,
                row.address,
                row.snippet,
                row.last_message_timestamp,
                row.is_read as i32,
                row.resolved_sender_name,
                row.last_sync_timestamp,
            ])?;
        }
    }

    tx.commit()?;
    Ok(rows.len())
}

/// All cached conversations, newest first
pub fn fetch_conversations(pool: &DbPool) -> Result<Vec<ConversationSummary>, SmsError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} ORDER BY last_message_timestamp DESC, thread_id DESC"
    ))?;

    let rows = stmt.query_map([], row_to_summary)?;

    let mut conversations = Vec::new();
    for row in rows {
        conversations.push(row?);
    }
    Ok(conversations)
}

pub fn get_conversation(
    pool: &DbPool,
    thread_id: i64,
) -> Result<Option<ConversationSummary>, SmsError> {
    let conn = pool.get()?;
    let result = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE thread_id = ?1"),
            params![thread_id],
            row_to_summary,
        )
        .optional()?;
    Ok(result)
}

pub fn thread_ids(pool: &DbPool) -> Result<Vec<i64>, SmsError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT thread_id FROM conversations")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Global conversation watermark; 0 when nothing has been synced yet.
pub fn max_sync_timestamp(pool: &DbPool) -> Result<i64, SmsError> {
    let conn = pool.get()?;
    let ts = conn.query_row(
        "SELECT COALESCE(MAX(last_sync_timestamp), 0) FROM conversations",
        [],
        |row| row.get(0),
    )?;
    Ok(ts)
}

pub(super) fn delete_in(conn: &Connection, thread_ids: &[i64]) -> Result<usize, SmsError> {
    let mut deleted = 0;
    for chunk in thread_ids.chunks(IN_CHUNK) {
        deleted += conn.execute(
            &format!(
                "DELETE FROM conversations WHERE thread_id IN ({})",
                placeholders(chunk.len())
            ),
            params_from_iter(chunk.iter()),
        )?;
    }
    Ok(deleted)
}

fn row_to_summary(row: &Row) -> Result<ConversationSummary, rusqlite::Error> {
    Ok(ConversationSummary {
        thread_id: row.get(0)?,
        address: row.get(1)?,
        snippet: row.get(2)?,
        last_message_timestamp: row.get(3)?,
        is_read: row.get::<_, i32>(4)? != 0,
        resolved_sender_name: row.get(5)?,
        last_sync_timestamp: row.get(6)?,
    })
}
