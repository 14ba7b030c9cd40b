//! SMS Sync Engine
//!
//! Mirrors the system provider into the local cache.
//!
//! - Conversations are fetched with `date > watermark`, where the watermark
//!   is the newest `last_sync_timestamp` in the cache. A zero watermark
//!   means first sync: everything, newest first, capped by
//!   `first_sync_limit`, followed by a cleanup of cache rows the provider
//!   no longer has.
//! - Thread details (address, date, read flag of the newest message) come
//!   from one batched query per sync rather than one per thread.
//! - Messages follow the same pattern with a per-thread watermark.
//!
//! Sync entry points never fail: provider, permission and cache errors are
//! logged and reported as [`SyncOutcome::Skipped`]. The watermark is only
//! advanced by a successful write, so the next trigger retries.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::adapters::sqlite::LocalCache;
use crate::config::SyncConfig;
use crate::contacts::ContactResolver;
use crate::error::SmsError;
use crate::provider::{ProviderMessage, ProviderThread, SmsProvider, ThreadDetail};
use crate::types::{ConversationSummary, MessageDirection, MessageRecord};

/// Row counts of one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Rows read from the provider
    pub fetched: usize,
    /// Rows written to the cache
    pub written: usize,
    /// Threads (or messages) removed from the cache
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SyncOutcome {
    Completed {
        fetched: usize,
        written: usize,
        removed: usize,
    },
    Skipped {
        reason: String,
    },
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed { .. })
    }

    pub fn stats(&self) -> Option<SyncStats> {
        match self {
            SyncOutcome::Completed {
                fetched,
                written,
                removed,
            } => Some(SyncStats {
                fetched: *fetched,
                written: *written,
                removed: *removed,
            }),
            SyncOutcome::Skipped { .. } => None,
        }
    }
}

impl From<SyncStats> for SyncOutcome {
    fn from(stats: SyncStats) -> Self {
        SyncOutcome::Completed {
            fetched: stats.fetched,
            written: stats.written,
            removed: stats.removed,
        }
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn to_record(message: ProviderMessage, sync_time: i64) -> Option<MessageRecord> {
    let Some(direction) = MessageDirection::from_provider_type(message.message_type) else {
        debug!(
            "Skipping message {} with unsupported type {}",
            message.id, message.message_type
        );
        return None;
    };

    Some(MessageRecord {
        id: message.id,
        thread_id: message.thread_id,
        address: message.address,
        body: message.body,
        timestamp: message.date,
        is_read: message.read,
        direction,
        subscription_id: message.subscription_id,
        last_sync_timestamp: sync_time,
    })
}

#[derive(Clone)]
pub struct SyncEngine {
    provider: Arc<dyn SmsProvider>,
    cache: LocalCache,
    contacts: Arc<ContactResolver>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        provider: Arc<dyn SmsProvider>,
        cache: LocalCache,
        contacts: Arc<ContactResolver>,
        config: SyncConfig,
    ) -> Self {
        Self {
            provider,
            cache,
            contacts,
            config,
        }
    }

    pub fn provider(&self) -> &Arc<dyn SmsProvider> {
        &self.provider
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn contacts(&self) -> &Arc<ContactResolver> {
        &self.contacts
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn ensure_permission(&self) -> Result<(), SmsError> {
        if self.provider.has_read_permission() {
            Ok(())
        } else {
            Err(SmsError::Permission(
                "SMS read permission not granted".to_string(),
            ))
        }
    }

    // ========== Detail lookups ==========

    /// Newest-message details for `thread_ids`, one provider query per
    /// `detail_batch_size` ids. Threads the provider no longer has are
    /// absent from the map.
    pub fn batch_fetch_conversation_details(
        &self,
        thread_ids: &[i64],
    ) -> Result<HashMap<i64, ThreadDetail>, SmsError> {
        let mut details = HashMap::with_capacity(thread_ids.len());
        for chunk in thread_ids.chunks(self.config.detail_batch_size.max(1)) {
            for detail in self.provider.query_thread_details(chunk)? {
                details.insert(detail.thread_id, detail);
            }
        }
        Ok(details)
    }

    pub fn fetch_conversation_detail(
        &self,
        thread_id: i64,
    ) -> Result<Option<ThreadDetail>, SmsError> {
        self.provider.query_thread_detail(thread_id)
    }

    fn summarize(
        &self,
        thread: &ProviderThread,
        detail: &ThreadDetail,
        sync_time: i64,
    ) -> ConversationSummary {
        ConversationSummary {
            thread_id: thread.thread_id,
            address: detail.address.clone(),
            snippet: thread.snippet.clone(),
            last_message_timestamp: thread.date.max(detail.date),
            is_read: detail.read,
            resolved_sender_name: self.contacts.resolve_display_name(&detail.address),
            last_sync_timestamp: sync_time,
        }
    }

    // ========== Blocking sync passes ==========

    /// Bring cached conversations up to date with the provider.
    pub fn sync_conversations_blocking(&self) -> Result<SyncStats, SmsError> {
        self.ensure_permission()?;

        let watermark = self.cache.max_conversation_sync_timestamp()?;
        let first_sync = watermark == 0;
        // Taken before querying so rows landing mid-pass stay above it
        let sync_time = now_ms().max(watermark);

        let threads = if first_sync {
            self.provider
                .query_threads(None, Some(self.config.first_sync_limit))?
        } else {
            self.provider.query_threads(Some(watermark), None)?
        };

        if threads.is_empty() && !first_sync {
            debug!("No conversations changed since {}", watermark);
            return Ok(SyncStats::default());
        }

        let thread_ids: Vec<i64> = threads.iter().map(|t| t.thread_id).collect();
        let details = self.batch_fetch_conversation_details(&thread_ids)?;

        let rows: Vec<ConversationSummary> = threads
            .iter()
            .filter_map(|thread| match details.get(&thread.thread_id) {
                Some(detail) => Some(self.summarize(thread, detail, sync_time)),
                None => {
                    debug!("Thread {} vanished before detail fetch", thread.thread_id);
                    None
                }
            })
            .collect();

        let written = self.cache.upsert_conversations(&rows)?;

        let removed = if first_sync {
            let keep: HashSet<i64> = rows.iter().map(|r| r.thread_id).collect();
            let stale = self.cache.delete_threads_except(&keep)?;
            if !stale.is_empty() {
                info!("First sync removed {} stale cached threads", stale.len());
            }
            stale.len()
        } else {
            0
        };

        Ok(SyncStats {
            fetched: threads.len(),
            written,
            removed,
        })
    }

    /// Bring one thread's cached messages up to date.
    pub fn sync_messages_blocking(&self, thread_id: i64) -> Result<SyncStats, SmsError> {
        self.ensure_permission()?;

        let watermark = self.cache.max_message_sync_timestamp(thread_id)?;
        let since = (watermark > 0).then_some(watermark);
        let sync_time = now_ms().max(watermark);

        let messages = self.provider.query_messages(thread_id, since)?;
        let fetched = messages.len();
        if fetched == 0 {
            debug!("No new messages in thread {}", thread_id);
            return Ok(SyncStats::default());
        }

        let records: Vec<MessageRecord> = messages
            .into_iter()
            .filter_map(|m| to_record(m, sync_time))
            .collect();

        let written = self.cache.upsert_messages(&records)?;
        Ok(SyncStats {
            fetched,
            written,
            removed: 0,
        })
    }

    /// Refresh one thread without watermark gating.
    ///
    /// Picks up changes a date-gated query cannot see (read flags, rows
    /// written with an older date). A thread gone upstream is removed.
    /// The conversation row keeps the global watermark: only one thread
    /// was read, so the conversation scope must not move forward.
    pub fn resync_thread_blocking(&self, thread_id: i64) -> Result<SyncStats, SmsError> {
        self.ensure_permission()?;

        let conversation_watermark = self.cache.max_conversation_sync_timestamp()?;
        let sync_time = now_ms().max(self.cache.max_message_sync_timestamp(thread_id)?);

        let Some(detail) = self.fetch_conversation_detail(thread_id)? else {
            let deleted = self.cache.delete_threads(&[thread_id])?;
            debug!("Thread {} no longer exists upstream", thread_id);
            return Ok(SyncStats {
                fetched: 0,
                written: 0,
                removed: deleted.conversations.min(1),
            });
        };

        let messages = self.provider.query_messages(thread_id, None)?;
        let fetched = messages.len() + 1;

        let snippet = messages
            .iter()
            .max_by_key(|m| (m.date, m.id))
            .map(|m| m.body.clone())
            .unwrap_or_default();
        let thread = ProviderThread {
            thread_id,
            snippet,
            date: detail.date,
        };
        let summary = self.summarize(&thread, &detail, conversation_watermark);

        let upstream_ids: HashSet<i64> = messages.iter().map(|m| m.id).collect();
        let stale_ids: Vec<i64> = self
            .cache
            .fetch_thread_messages(thread_id)?
            .into_iter()
            .map(|m| m.id)
            .filter(|id| !upstream_ids.contains(id))
            .collect();

        let records: Vec<MessageRecord> = messages
            .into_iter()
            .filter_map(|m| to_record(m, sync_time))
            .collect();

        let mut written = self.cache.upsert_conversations(&[summary])?;
        written += self.cache.upsert_messages(&records)?;
        let removed = self.cache.delete_messages(&stale_ids)?;

        Ok(SyncStats {
            fetched,
            written,
            removed,
        })
    }

    /// Drop cached threads that no longer exist upstream.
    ///
    /// Incremental syncs only ever see new activity, never deletions made
    /// by other apps; this pass catches those.
    pub fn prune_deleted_threads_blocking(&self) -> Result<SyncStats, SmsError> {
        self.ensure_permission()?;

        let upstream: HashSet<i64> = self.provider.query_thread_ids()?.into_iter().collect();
        let removed = self.cache.delete_threads_except(&upstream)?;

        Ok(SyncStats {
            fetched: upstream.len(),
            written: 0,
            removed: removed.len(),
        })
    }

    // ========== Async entry points ==========

    async fn run<F>(&self, label: &'static str, op: F) -> SyncOutcome
    where
        F: FnOnce(&SyncEngine) -> Result<SyncStats, SmsError> + Send + 'static,
    {
        let engine = self.clone();
        let started = Instant::now();

        match tokio::task::spawn_blocking(move || op(&engine)).await {
            Ok(Ok(stats)) => {
                info!(
                    fetched = stats.fetched,
                    written = stats.written,
                    removed = stats.removed,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "{} complete",
                    label
                );
                stats.into()
            }
            Ok(Err(SmsError::Permission(reason))) => {
                info!("{} skipped: {}", label, reason);
                SyncOutcome::Skipped { reason }
            }
            Ok(Err(e)) => {
                warn!("{} failed: {}", label, e);
                SyncOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                error!("{} task failed: {}", label, e);
                SyncOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub async fn sync_conversations(&self) -> SyncOutcome {
        self.run("Conversation sync", |engine| {
            engine.sync_conversations_blocking()
        })
        .await
    }

    pub async fn sync_messages(&self, thread_id: i64) -> SyncOutcome {
        self.run("Message sync", move |engine| {
            engine.sync_messages_blocking(thread_id)
        })
        .await
    }

    pub async fn resync_thread(&self, thread_id: i64) -> SyncOutcome {
        self.run("Thread resync", move |engine| {
            engine.resync_thread_blocking(thread_id)
        })
        .await
    }

    pub async fn prune_deleted_threads(&self) -> SyncOutcome {
        self.run("Thread prune", |engine| {
            engine.prune_deleted_threads_blocking()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContactCacheConfig;
    use crate::provider::{
        MemoryContacts, MemoryProvider, NewProviderMessage, ProviderChange, MESSAGE_TYPE_SENT,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Delegates to a [`MemoryProvider`] and lands one incoming message
    /// right after the first detail or message query of a pass.
    struct ArrivesMidPass {
        inner: Arc<MemoryProvider>,
        address: &'static str,
        fired: AtomicBool,
    }

    impl ArrivesMidPass {
        fn new(inner: Arc<MemoryProvider>, address: &'static str) -> Self {
            Self {
                inner,
                address,
                fired: AtomicBool::new(false),
            }
        }

        fn arrive(&self) {
            if !self.fired.swap(true, Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
                self.inner.push_incoming(self.address, "late", now_ms());
            }
        }
    }

    impl SmsProvider for ArrivesMidPass {
        fn has_read_permission(&self) -> bool {
            self.inner.has_read_permission()
        }

        fn query_threads(
            &self,
            since: Option<i64>,
            limit: Option<usize>,
        ) -> Result<Vec<ProviderThread>, SmsError> {
            self.inner.query_threads(since, limit)
        }

        fn query_thread_details(&self, thread_ids: &[i64]) -> Result<Vec<ThreadDetail>, SmsError> {
            let details = self.inner.query_thread_details(thread_ids);
            self.arrive();
            details
        }

        fn query_thread_detail(&self, thread_id: i64) -> Result<Option<ThreadDetail>, SmsError> {
            self.inner.query_thread_detail(thread_id)
        }

        fn query_thread_ids(&self) -> Result<Vec<i64>, SmsError> {
            self.inner.query_thread_ids()
        }

        fn query_messages(
            &self,
            thread_id: i64,
            since: Option<i64>,
        ) -> Result<Vec<ProviderMessage>, SmsError> {
            let messages = self.inner.query_messages(thread_id, since);
            self.arrive();
            messages
        }

        fn delete_thread(&self, thread_id: i64) -> Result<usize, SmsError> {
            self.inner.delete_thread(thread_id)
        }

        fn delete_message(&self, id: i64) -> Result<usize, SmsError> {
            self.inner.delete_message(id)
        }

        fn mark_thread_read(&self, thread_id: i64) -> Result<usize, SmsError> {
            self.inner.mark_thread_read(thread_id)
        }

        fn insert_message(&self, message: &NewProviderMessage) -> Result<i64, SmsError> {
            self.inner.insert_message(message)
        }

        fn thread_id_for_address(&self, address: &str) -> Result<i64, SmsError> {
            self.inner.thread_id_for_address(address)
        }

        fn subscribe_changes(&self) -> flume::Receiver<ProviderChange> {
            self.inner.subscribe_changes()
        }
    }

    fn engine_over(provider: Arc<dyn SmsProvider>) -> SyncEngine {
        let resolver = Arc::new(ContactResolver::new(
            Arc::new(MemoryContacts::new()),
            &ContactCacheConfig::default(),
        ));
        SyncEngine::new(
            provider,
            LocalCache::in_memory().unwrap(),
            resolver,
            SyncConfig::default(),
        )
    }

    struct Fixture {
        provider: Arc<MemoryProvider>,
        contacts: Arc<MemoryContacts>,
        engine: SyncEngine,
    }

    fn fixture_with(config: SyncConfig) -> Fixture {
        let provider = Arc::new(MemoryProvider::new());
        let contacts = Arc::new(MemoryContacts::new());
        let resolver = Arc::new(ContactResolver::new(
            contacts.clone(),
            &ContactCacheConfig::default(),
        ));
        let engine = SyncEngine::new(
            provider.clone(),
            LocalCache::in_memory().unwrap(),
            resolver,
            config,
        );
        Fixture {
            provider,
            contacts,
            engine,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(SyncConfig::default())
    }

    #[test]
    fn test_first_sync_writes_every_thread() {
        let f = fixture();
        f.contacts.add_contact("+15550001", Some("Alice"));
        f.provider.push_incoming("+15550001", "hi", 1_000);
        f.provider.push_incoming("+15550002", "hello", 2_000);
        f.provider.push_incoming("+15550003", "hey", 3_000);

        let before = now_ms();
        let stats = f.engine.sync_conversations_blocking().unwrap();
        assert_eq!(stats.fetched, 3);
        assert_eq!(stats.written, 3);

        let rows = f.engine.cache().fetch_conversations().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].snippet, "hey");
        assert!(!rows[0].is_read);

        let alice = rows.iter().find(|r| r.address == "+15550001").unwrap();
        assert_eq!(alice.resolved_sender_name.as_deref(), Some("Alice"));

        // watermark equals the sync time
        let watermark = f.engine.cache().max_conversation_sync_timestamp().unwrap();
        assert!(watermark >= before);
        assert!(rows.iter().all(|r| r.last_sync_timestamp == watermark));
    }

    #[test]
    fn test_incremental_sync_rewrites_only_changed_thread() {
        let f = fixture();
        f.provider.push_incoming("+15550001", "a", 1_000);
        f.provider.push_incoming("+15550002", "b", 2_000);
        f.engine.sync_conversations_blocking().unwrap();
        let watermark = f.engine.cache().max_conversation_sync_timestamp().unwrap();

        let (_, changed) = f.provider.push_incoming("+15550002", "new", watermark + 10_000);
        let batches_before = f.provider.detail_batches().len();

        let stats = f.engine.sync_conversations_blocking().unwrap();
        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.written, 1);
        assert_eq!(
            f.provider.detail_batches()[batches_before..],
            [vec![changed]]
        );

        let row = f.engine.cache().get_conversation(changed).unwrap().unwrap();
        assert_eq!(row.snippet, "new");
        assert!(row.last_sync_timestamp >= watermark);
    }

    #[test]
    fn test_repeat_sync_is_idempotent() {
        let f = fixture();
        f.provider.push_incoming("+15550001", "a", 1_000);
        f.provider.push_incoming("+15550002", "b", 2_000);

        f.engine.sync_conversations_blocking().unwrap();
        let first = f.engine.cache().fetch_conversations().unwrap();
        let watermark = f.engine.cache().max_conversation_sync_timestamp().unwrap();

        let stats = f.engine.sync_conversations_blocking().unwrap();
        assert_eq!(stats, SyncStats::default());
        assert_eq!(f.engine.cache().fetch_conversations().unwrap(), first);
        assert_eq!(
            f.engine.cache().max_conversation_sync_timestamp().unwrap(),
            watermark
        );
    }

    #[test]
    fn test_batched_details_match_single_lookups() {
        let f = fixture_with(SyncConfig {
            detail_batch_size: 2,
            ..SyncConfig::default()
        });
        let mut ids = Vec::new();
        for i in 0..5 {
            let (_, thread) = f.provider.push_incoming(&format!("+1555000{i}"), "x", 100 * i);
            ids.push(thread);
        }
        ids.push(999);

        let batched = f.engine.batch_fetch_conversation_details(&ids).unwrap();
        assert_eq!(batched.len(), 5);
        for id in &ids {
            assert_eq!(
                batched.get(id).cloned(),
                f.engine.fetch_conversation_detail(*id).unwrap()
            );
        }
        // 6 ids at 2 per batch
        assert_eq!(f.provider.detail_batches().len(), 3);
    }

    #[test]
    fn test_first_sync_limit_caps_rows() {
        let f = fixture_with(SyncConfig {
            first_sync_limit: 2,
            ..SyncConfig::default()
        });
        for i in 0..4 {
            f.provider.push_incoming(&format!("+1555000{i}"), "x", 100 + i);
        }

        let stats = f.engine.sync_conversations_blocking().unwrap();
        assert_eq!(stats.written, 2);
        let rows = f.engine.cache().fetch_conversations().unwrap();
        assert_eq!(rows[0].last_message_timestamp, 103);
    }

    #[test]
    fn test_first_sync_removes_stale_cache_rows() {
        let f = fixture();
        f.provider.push_incoming("+15550001", "a", 1_000);

        // left over from an earlier install: messages only, no summary
        f.engine
            .cache()
            .upsert_messages(&[MessageRecord {
                id: 900,
                thread_id: 77,
                address: "+15559999".to_string(),
                body: "old".to_string(),
                timestamp: 10,
                is_read: true,
                direction: MessageDirection::Inbox,
                subscription_id: -1,
                last_sync_timestamp: 10,
            }])
            .unwrap();

        let stats = f.engine.sync_conversations_blocking().unwrap();
        assert_eq!(stats.removed, 1);
        assert!(f.engine.cache().fetch_thread_messages(77).unwrap().is_empty());
    }

    #[test]
    fn test_permission_denied_is_skipped() {
        let f = fixture();
        f.provider.push_incoming("+15550001", "a", 1_000);
        f.provider.set_read_permission(false);

        let rt = tokio::runtime::Runtime::new().unwrap();
        let outcome = rt.block_on(f.engine.sync_conversations());
        assert!(matches!(outcome, SyncOutcome::Skipped { .. }));
        assert!(f.engine.cache().fetch_conversations().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_skipped_and_retried() {
        let f = fixture();
        f.provider.push_incoming("+15550001", "a", 1_000);
        f.provider.set_fail_queries(true);

        assert!(!f.engine.sync_conversations().await.is_completed());
        assert_eq!(
            f.engine.cache().max_conversation_sync_timestamp().unwrap(),
            0
        );

        f.provider.set_fail_queries(false);
        let outcome = f.engine.sync_conversations().await;
        assert_eq!(outcome.stats().map(|s| s.written), Some(1));
    }

    #[test]
    fn test_message_sync_maps_directions() {
        let f = fixture();
        let (_, thread) = f.provider.push_incoming("+15550001", "in", 1_000);
        f.provider
            .push_message("+15550001", "out", 2_000, MESSAGE_TYPE_SENT, true);
        // draft, skipped
        f.provider.push_message("+15550001", "draft", 3_000, 3, true);

        let stats = f.engine.sync_messages_blocking(thread).unwrap();
        assert_eq!(stats.fetched, 3);
        assert_eq!(stats.written, 2);

        let messages = f.engine.cache().fetch_thread_messages(thread).unwrap();
        assert_eq!(messages[0].direction, MessageDirection::Inbox);
        assert_eq!(messages[1].direction, MessageDirection::Sent);

        // nothing new the second time around
        assert_eq!(
            f.engine.sync_messages_blocking(thread).unwrap(),
            SyncStats::default()
        );
    }

    #[test]
    fn test_resync_picks_up_read_flag() {
        let f = fixture();
        let (_, thread) = f.provider.push_incoming("+15550001", "in", 1_000);
        f.engine.sync_conversations_blocking().unwrap();
        f.engine.sync_messages_blocking(thread).unwrap();

        f.provider.mark_thread_read(thread).unwrap();
        // date-gated sync cannot see a flag change
        f.engine.sync_conversations_blocking().unwrap();
        assert!(!f.engine.cache().get_conversation(thread).unwrap().unwrap().is_read);

        f.engine.resync_thread_blocking(thread).unwrap();
        assert!(f.engine.cache().get_conversation(thread).unwrap().unwrap().is_read);
        assert!(f.engine.cache().fetch_thread_messages(thread).unwrap()[0].is_read);
    }

    #[test]
    fn test_resync_removes_thread_gone_upstream() {
        let f = fixture();
        let (_, thread) = f.provider.push_incoming("+15550001", "in", 1_000);
        f.engine.sync_conversations_blocking().unwrap();

        f.provider.delete_thread(thread).unwrap();
        let stats = f.engine.resync_thread_blocking(thread).unwrap();
        assert_eq!(stats.removed, 1);
        assert!(f.engine.cache().get_conversation(thread).unwrap().is_none());
    }

    #[test]
    fn test_resync_does_not_hide_other_thread_activity() {
        let f = fixture();
        let (_, a) = f.provider.push_incoming("+15550001", "a", 1_000);
        let (_, b) = f.provider.push_incoming("+15550002", "b", 2_000);
        f.engine.sync_conversations_blocking().unwrap();
        let watermark = f.engine.cache().max_conversation_sync_timestamp().unwrap();

        std::thread::sleep(Duration::from_millis(5));
        f.provider.push_incoming("+15550002", "new on b", now_ms());

        // e.g. the refresh after marking A read
        f.engine.resync_thread_blocking(a).unwrap();
        assert_eq!(
            f.engine.cache().max_conversation_sync_timestamp().unwrap(),
            watermark
        );

        let stats = f.engine.sync_conversations_blocking().unwrap();
        assert_eq!(stats.fetched, 1);
        let row = f.engine.cache().get_conversation(b).unwrap().unwrap();
        assert_eq!(row.snippet, "new on b");
    }

    #[test]
    fn test_thread_arriving_during_sync_is_picked_up_next_time() {
        let provider = Arc::new(MemoryProvider::new());
        provider.push_incoming("+15550001", "a", 1_000);
        let engine = engine_over(Arc::new(ArrivesMidPass::new(provider.clone(), "+15550002")));

        let first = engine.sync_conversations_blocking().unwrap();
        assert_eq!(first.written, 1);
        assert_eq!(provider.query_thread_ids().unwrap().len(), 2);

        let second = engine.sync_conversations_blocking().unwrap();
        assert_eq!(second.fetched, 1);
        assert_eq!(engine.cache().fetch_conversations().unwrap().len(), 2);
    }

    #[test]
    fn test_message_arriving_during_sync_is_picked_up_next_time() {
        let provider = Arc::new(MemoryProvider::new());
        let (_, thread) = provider.push_incoming("+15550001", "a", 1_000);
        let engine = engine_over(Arc::new(ArrivesMidPass::new(provider.clone(), "+15550001")));

        assert_eq!(engine.sync_messages_blocking(thread).unwrap().written, 1);

        let second = engine.sync_messages_blocking(thread).unwrap();
        assert_eq!(second.written, 1);
        let bodies: Vec<String> = engine
            .cache()
            .fetch_thread_messages(thread)
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, vec!["a".to_string(), "late".to_string()]);
    }

    #[test]
    fn test_prune_drops_threads_deleted_elsewhere() {
        let f = fixture();
        let (_, a) = f.provider.push_incoming("+15550001", "a", 1_000);
        let (_, b) = f.provider.push_incoming("+15550002", "b", 2_000);
        f.engine.sync_conversations_blocking().unwrap();

        f.provider.delete_thread(a).unwrap();
        let stats = f.engine.prune_deleted_threads_blocking().unwrap();
        assert_eq!(stats.removed, 1);
        assert_eq!(f.engine.cache().conversation_thread_ids().unwrap(), vec![b]);
    }
}
