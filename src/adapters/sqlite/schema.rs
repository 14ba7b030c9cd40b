use rusqlite::Connection;

use crate::error::SmsError;

pub fn initialize_schema(conn: &Connection) -> Result<(), SmsError> {
    conn.execute_batch("
        -- One row per provider thread, fully replaced on every sync.
        -- Archived/pinned/muted state lives in settings, never here.
        CREATE TABLE IF NOT EXISTS conversations (
            thread_id               INTEGER PRIMARY KEY,
            address                 TEXT NOT NULL,
            snippet                 TEXT NOT NULL DEFAULT '',
            last_message_timestamp  INTEGER NOT NULL,   -- epoch ms
            is_read                 INTEGER NOT NULL DEFAULT 1,
            resolved_sender_name    TEXT,
            last_sync_timestamp     INTEGER NOT NULL    -- epoch ms, sync watermark
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_date ON conversations(last_message_timestamp DESC);

        -- Cached provider messages. thread_id is not a declared foreign key:
        -- message sync may run before the owning conversation row exists.
        CREATE TABLE IF NOT EXISTS messages (
            id                      INTEGER PRIMARY KEY,
            thread_id               INTEGER NOT NULL,
            address                 TEXT NOT NULL,
            body                    TEXT NOT NULL DEFAULT '',
            timestamp               INTEGER NOT NULL,   -- epoch ms
            is_read                 INTEGER NOT NULL DEFAULT 1,
            direction               TEXT NOT NULL,      -- 'inbox' | 'sent'
            subscription_id         INTEGER NOT NULL DEFAULT -1,
            last_sync_timestamp     INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id, timestamp);

        -- Preference store: one serialized value per key
        CREATE TABLE IF NOT EXISTS settings (
            key         TEXT PRIMARY KEY,
            value       TEXT NOT NULL,
            updated_at  INTEGER NOT NULL
        );
    ")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creation() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        // idempotent
        initialize_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"conversations".to_string()));
        assert!(tables.contains(&"messages".to_string()));
        assert!(tables.contains(&"settings".to_string()));
    }
}
