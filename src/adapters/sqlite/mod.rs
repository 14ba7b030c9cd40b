//! SQLite local cache
//!
//! Durable copies of provider conversations and messages plus the
//! settings table backing the preference store. Every write publishes a
//! [`CacheChange`] so streams can re-query.

pub mod conversations;
pub mod messages;
pub mod pool;
pub mod schema;
pub mod settings;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::SmsError;
use crate::sync::feed::ChangeFeed;
use crate::types::{ConversationSummary, MessageRecord};

pub use pool::DbPool;

// SQLite caps bound parameters per statement; stay well below it.
pub(crate) const IN_CHUNK: usize = 500;

pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

/// What part of the cache changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheChange {
    Conversations,
    /// Messages of these threads changed
    Messages { thread_ids: Vec<i64> },
}

impl CacheChange {
    pub fn touches_thread(&self, thread_id: i64) -> bool {
        match self {
            CacheChange::Conversations => false,
            CacheChange::Messages { thread_ids } => thread_ids.contains(&thread_id),
        }
    }
}

/// Result of a cascading thread delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletedRows {
    pub conversations: usize,
    pub messages: usize,
}

#[derive(Clone)]
pub struct LocalCache {
    pool: DbPool,
    changes: Arc<ChangeFeed<CacheChange>>,
}

impl LocalCache {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self, SmsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SmsError::Database(format!("Failed to create cache dir: {e}")))?;
        }
        Self::from_pool(pool::create_pool(path)?)
    }

    /// In-memory cache (for testing)
    pub fn in_memory() -> Result<Self, SmsError> {
        Self::from_pool(pool::create_memory_pool()?)
    }

    pub fn from_pool(pool: DbPool) -> Result<Self, SmsError> {
        {
            let conn = pool.get()?;
            schema::initialize_schema(&conn)?;
        }
        Ok(Self {
            pool,
            changes: Arc::new(ChangeFeed::new()),
        })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn subscribe(&self) -> flume::Receiver<CacheChange> {
        self.changes.subscribe()
    }

    // ========== Conversations ==========

    pub fn upsert_conversations(&self, rows: &[ConversationSummary]) -> Result<usize, SmsError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let count = conversations::upsert_conversations(&self.pool, rows)?;
        self.changes.publish(CacheChange::Conversations);
        Ok(count)
    }

    pub fn fetch_conversations(&self) -> Result<Vec<ConversationSummary>, SmsError> {
        conversations::fetch_conversations(&self.pool)
    }

    pub fn get_conversation(&self, thread_id: i64) -> Result<Option<ConversationSummary>, SmsError> {
        conversations::get_conversation(&self.pool, thread_id)
    }

    pub fn conversation_thread_ids(&self) -> Result<Vec<i64>, SmsError> {
        conversations::thread_ids(&self.pool)
    }

    pub fn max_conversation_sync_timestamp(&self) -> Result<i64, SmsError> {
        conversations::max_sync_timestamp(&self.pool)
    }

    // ========== Messages ==========

    pub fn upsert_messages(&self, rows: &[MessageRecord]) -> Result<usize, SmsError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let count = messages::upsert_messages(&self.pool, rows)?;

        let mut thread_ids: Vec<i64> = rows.iter().map(|r| r.thread_id).collect();
        thread_ids.sort_unstable();
        thread_ids.dedup();
        self.changes.publish(CacheChange::Messages { thread_ids });
        Ok(count)
    }

    pub fn fetch_thread_messages(&self, thread_id: i64) -> Result<Vec<MessageRecord>, SmsError> {
        messages::fetch_thread_messages(&self.pool, thread_id)
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRecord>, SmsError> {
        messages::get_message(&self.pool, id)
    }

    pub fn max_message_sync_timestamp(&self, thread_id: i64) -> Result<i64, SmsError> {
        messages::max_sync_timestamp_for_thread(&self.pool, thread_id)
    }

    pub fn count_messages(&self) -> Result<usize, SmsError> {
        messages::count_messages(&self.pool)
    }

    // ========== Deletes ==========

    /// Remove conversations and all their messages in one transaction.
    pub fn delete_threads(&self, thread_ids: &[i64]) -> Result<DeletedRows, SmsError> {
        if thread_ids.is_empty() {
            return Ok(DeletedRows::default());
        }

        let deleted = {
            let conn = self.pool.get()?;
            let tx = conn.unchecked_transaction()?;
            let deleted = DeletedRows {
                conversations: conversations::delete_in(&tx, thread_ids)?,
                messages: messages::delete_for_threads(&tx, thread_ids)?,
            };
            tx.commit()?;
            deleted
        };

        debug!(
            threads = thread_ids.len(),
            conversations = deleted.conversations,
            messages = deleted.messages,
            "Deleted cached threads"
        );

        self.changes.publish(CacheChange::Conversations);
        self.changes.publish(CacheChange::Messages {
            thread_ids: thread_ids.to_vec(),
        });
        Ok(deleted)
    }

    pub fn delete_messages(&self, ids: &[i64]) -> Result<usize, SmsError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let (deleted, thread_ids) = {
            let conn = self.pool.get()?;
            let tx = conn.unchecked_transaction()?;
            let thread_ids = messages::thread_ids_for(&tx, ids)?;
            let deleted = messages::delete_in(&tx, ids)?;
            tx.commit()?;
            (deleted, thread_ids)
        };

        if deleted > 0 {
            self.changes.publish(CacheChange::Messages { thread_ids });
        }
        Ok(deleted)
    }

    /// Delete every cached thread (conversation or messages) not in `keep`.
    ///
    /// Returns the removed thread ids.
    pub fn delete_threads_except(&self, keep: &HashSet<i64>) -> Result<Vec<i64>, SmsError> {
        let cached: HashSet<i64> = {
            let conn = self.pool.get()?;
            let mut stmt = conn.prepare(
                "SELECT thread_id FROM conversations
                 UNION
                 SELECT DISTINCT thread_id FROM messages",
            )?;
            let ids = stmt
                .query_map([], |row| row.get::<_, i64>(0))?
                .collect::<Result<HashSet<i64>, _>>()?;
            ids
        };

        let mut stale: Vec<i64> = cached.difference(keep).copied().collect();
        stale.sort_unstable();

        if !stale.is_empty() {
            self.delete_threads(&stale)?;
        }
        Ok(stale)
    }
}
