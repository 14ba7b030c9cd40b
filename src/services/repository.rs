//! Conversation and message repository
//!
//! Read side: [`MessageRepository::conversations`] and
//! [`MessageRepository::messages`] return subscriptions that emit the
//! cached list immediately, kick off a background sync, and re-emit
//! (debounced) whenever the cache or the preferences change. Archived,
//! pinned, muted and blocked state is joined from the preference store at
//! read time and never written to the cache.
//!
//! Write side: bulk maintenance returns an [`ActionOutcome`] and never
//! fails; `send_message` returns `Result` so the caller can react inline.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::helpers::{run_blocking, spawn_blocking_logged};
use crate::adapters::sqlite::CacheChange;
use crate::error::{Result, SmsError};
use crate::preferences::{PreferenceStore, ThreadSet};
use crate::provider::{NewProviderMessage, SmsTransport, MESSAGE_TYPE_SENT};
use crate::sync::debounce::settle;
use crate::sync::engine::now_ms;
use crate::sync::{ChangeObserver, ObserverScope, SyncEngine, SyncOutcome};
use crate::types::{
    ActionOutcome, Conversation, ConversationSummary, Message, PreferenceSnapshot, Theme,
};

/// Live query. Dropping it (or calling [`Subscription::cancel`]) stops the
/// emitting task and unregisters the provider observer.
pub struct Subscription<T> {
    rx: flume::Receiver<T>,
    observer: ChangeObserver,
    task: JoinHandle<()>,
}

pub type ConversationStream = Subscription<Vec<Conversation>>;
pub type MessageStream = Subscription<Vec<Message>>;

impl<T> Subscription<T> {
    /// Next emission, `None` once the stream has ended
    pub async fn next(&self) -> Option<T> {
        self.rx.recv_async().await.ok()
    }

    pub fn try_next(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn cancel(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
        self.observer.stop();
    }
}

/// Wait for one relevant cache change, or any preference change when
/// `prefs` is given. `false` once a source has closed.
async fn next_change<F>(
    cache: &flume::Receiver<CacheChange>,
    prefs: Option<&flume::Receiver<PreferenceSnapshot>>,
    relevant: F,
) -> bool
where
    F: Fn(&CacheChange) -> bool,
{
    loop {
        let change = match prefs {
            Some(prefs) => tokio::select! {
                change = cache.recv_async() => change,
                snapshot = prefs.recv_async() => return snapshot.is_ok(),
            },
            None => cache.recv_async().await,
        };

        match change {
            Ok(change) if relevant(&change) => return true,
            Ok(_) => continue,
            Err(_) => return false,
        }
    }
}

async fn wait_for_change<F>(
    window: Duration,
    cache: &flume::Receiver<CacheChange>,
    prefs: Option<&flume::Receiver<PreferenceSnapshot>>,
    relevant: F,
) -> bool
where
    F: Fn(&CacheChange) -> bool + Copy,
{
    if !next_change(cache, prefs, relevant).await {
        return false;
    }
    settle(window, move || next_change(cache, prefs, relevant)).await
}

#[derive(Clone)]
pub struct MessageRepository {
    engine: SyncEngine,
    prefs: Arc<PreferenceStore>,
    transport: Arc<dyn SmsTransport>,
}

impl MessageRepository {
    pub fn new(
        engine: SyncEngine,
        prefs: Arc<PreferenceStore>,
        transport: Arc<dyn SmsTransport>,
    ) -> Self {
        Self {
            engine,
            prefs,
            transport,
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn preferences(&self) -> &Arc<PreferenceStore> {
        &self.prefs
    }

    fn permission_denied() -> SmsError {
        SmsError::Permission("SMS read permission not granted".to_string())
    }

    // ========== Read streams ==========

    /// Subscribe to the conversation list, newest first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn conversations(&self) -> ConversationStream {
        let (tx, rx) = flume::unbounded();
        let observer = ChangeObserver::start(self.engine.clone(), ObserverScope::Conversations);

        // Register before the first read so no change is missed in between
        let cache_rx = self.engine.cache().subscribe();
        let prefs_rx = self.prefs.subscribe();

        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.sync_conversations().await;
        });

        let repo = self.clone();
        let window = self.engine.config().stream_debounce();
        let task = tokio::spawn(async move {
            loop {
                match repo.load_conversations().await {
                    Ok(list) => {
                        if tx.send(list).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to load conversations: {}", e),
                }

                let relevant = |change: &CacheChange| matches!(change, CacheChange::Conversations);
                if !wait_for_change(window, &cache_rx, Some(&prefs_rx), relevant).await {
                    break;
                }
            }
            debug!("Conversation stream ended");
        });

        Subscription { rx, observer, task }
    }

    /// Subscribe to one thread's messages, oldest first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn messages(&self, thread_id: i64) -> MessageStream {
        let (tx, rx) = flume::unbounded();
        let observer =
            ChangeObserver::start(self.engine.clone(), ObserverScope::Thread(thread_id));
        let cache_rx = self.engine.cache().subscribe();

        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.sync_messages(thread_id).await;
        });

        let repo = self.clone();
        let window = self.engine.config().stream_debounce();
        let task = tokio::spawn(async move {
            loop {
                match repo.load_messages(thread_id).await {
                    Ok(list) => {
                        if tx.send(list).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to load messages for thread {}: {}", thread_id, e),
                }

                let relevant = move |change: &CacheChange| change.touches_thread(thread_id);
                if !wait_for_change(window, &cache_rx, None, relevant).await {
                    break;
                }
            }
            debug!("Message stream for thread {} ended", thread_id);
        });

        Subscription { rx, observer, task }
    }

    async fn load_conversations(&self) -> Result<Vec<Conversation>> {
        let repo = self.clone();
        let (list, to_archive) = run_blocking(move || repo.load_conversations_blocking()).await?;

        if !to_archive.is_empty() {
            info!("Auto-archiving {} threads from unknown senders", to_archive.len());
            let prefs = self.prefs.clone();
            spawn_blocking_logged("Auto-archive", move || prefs.add_archived(&to_archive));
        }
        Ok(list)
    }

    /// Current conversation list plus the thread ids that auto-archive
    /// wants persisted.
    fn load_conversations_blocking(&self) -> Result<(Vec<Conversation>, Vec<i64>)> {
        if !self.engine.provider().has_read_permission() {
            debug!("No read permission, emitting empty conversation list");
            return Ok((Vec::new(), Vec::new()));
        }

        let rows = self.engine.cache().fetch_conversations()?;
        let mut prefs = self.prefs.snapshot()?;

        let mut to_archive = Vec::new();
        if prefs.auto_archive_unknown {
            let candidates: Vec<&ConversationSummary> = rows
                .iter()
                .filter(|row| !prefs.archived_threads.contains(&row.thread_id))
                .collect();
            let unknown = self
                .engine
                .contacts()
                .resolve_unknown_batch(candidates.iter().map(|row| row.address.as_str()));

            to_archive = candidates
                .iter()
                .filter(|row| unknown.contains(&row.address))
                .map(|row| row.thread_id)
                .collect();
            prefs.archived_threads.extend(to_archive.iter().copied());
        }

        let list = rows
            .iter()
            .map(|row| Conversation::from_summary(row, &prefs))
            .collect();
        Ok((list, to_archive))
    }

    async fn load_messages(&self, thread_id: i64) -> Result<Vec<Message>> {
        let engine = self.engine.clone();
        run_blocking(move || {
            if !engine.provider().has_read_permission() {
                return Ok(Vec::new());
            }
            Ok(engine
                .cache()
                .fetch_thread_messages(thread_id)?
                .into_iter()
                .map(Message::from)
                .collect())
        })
        .await
    }

    /// Manual refresh: incremental sync plus a pass for threads deleted
    /// by other apps.
    pub async fn refresh(&self) -> SyncOutcome {
        let outcome = self.engine.sync_conversations().await;
        if outcome.is_completed() {
            self.engine.prune_deleted_threads().await;
        }
        outcome
    }

    // ========== Preference writes ==========

    async fn edit_preferences<F>(&self, label: &'static str, edit: F) -> ActionOutcome<bool>
    where
        F: FnOnce(&PreferenceStore) -> Result<bool> + Send + 'static,
    {
        let prefs = self.prefs.clone();
        let result = run_blocking(move || edit(prefs.as_ref())).await;
        match &result {
            Ok(changed) => debug!("{}: changed={}", label, changed),
            Err(e) => warn!("{} failed: {}", label, e),
        }
        result.into()
    }

    /// Mark threads archived. `data` is whether anything changed.
    pub async fn archive_threads(&self, thread_ids: &[i64]) -> ActionOutcome<bool> {
        let ids = thread_ids.to_vec();
        self.edit_preferences("Archive", move |prefs| prefs.add_archived(&ids))
            .await
    }

    pub async fn unarchive_threads(&self, thread_ids: &[i64]) -> ActionOutcome<bool> {
        let ids = thread_ids.to_vec();
        self.edit_preferences("Unarchive", move |prefs| prefs.remove_archived(&ids))
            .await
    }

    pub async fn pin_threads(&self, thread_ids: &[i64]) -> ActionOutcome<bool> {
        let ids = thread_ids.to_vec();
        self.edit_preferences("Pin", move |prefs| {
            prefs.add_threads(ThreadSet::Pinned, &ids)
        })
        .await
    }

    pub async fn unpin_threads(&self, thread_ids: &[i64]) -> ActionOutcome<bool> {
        let ids = thread_ids.to_vec();
        self.edit_preferences("Unpin", move |prefs| {
            prefs.remove_threads(ThreadSet::Pinned, &ids)
        })
        .await
    }

    pub async fn mute_threads(&self, thread_ids: &[i64]) -> ActionOutcome<bool> {
        let ids = thread_ids.to_vec();
        self.edit_preferences("Mute", move |prefs| {
            prefs.add_threads(ThreadSet::Muted, &ids)
        })
        .await
    }

    pub async fn unmute_threads(&self, thread_ids: &[i64]) -> ActionOutcome<bool> {
        let ids = thread_ids.to_vec();
        self.edit_preferences("Unmute", move |prefs| {
            prefs.remove_threads(ThreadSet::Muted, &ids)
        })
        .await
    }

    pub async fn block_addresses(&self, addresses: &[String]) -> ActionOutcome<bool> {
        let addresses = addresses.to_vec();
        self.edit_preferences("Block", move |prefs| prefs.block_addresses(&addresses))
            .await
    }

    pub async fn unblock_addresses(&self, addresses: &[String]) -> ActionOutcome<bool> {
        let addresses = addresses.to_vec();
        self.edit_preferences("Unblock", move |prefs| {
            prefs.unblock_addresses(&addresses)
        })
        .await
    }

    pub async fn set_auto_archive_unknown(&self, enabled: bool) -> ActionOutcome<bool> {
        self.edit_preferences("Auto-archive toggle", move |prefs| {
            prefs.set_auto_archive_unknown(enabled)
        })
        .await
    }

    pub async fn set_theme(&self, theme: Theme) -> ActionOutcome<bool> {
        self.edit_preferences("Theme", move |prefs| prefs.set_theme(theme))
            .await
    }

    // ========== Provider writes ==========

    /// Delete threads upstream, then drop their cache rows in the
    /// background.
    ///
    /// Stops at the first provider error. Threads deleted before it stay
    /// deleted and the failure message says how many went through.
    pub async fn delete_threads(&self, thread_ids: &[i64]) -> ActionOutcome<usize> {
        if thread_ids.is_empty() {
            return ActionOutcome::success(0);
        }

        let engine = self.engine.clone();
        let ids = thread_ids.to_vec();
        let result = run_blocking(move || {
            let provider = engine.provider();
            if !provider.has_read_permission() {
                return Err(Self::permission_denied());
            }

            let mut deleted = Vec::with_capacity(ids.len());
            for id in &ids {
                if let Err(e) = provider.delete_thread(*id) {
                    return Ok((deleted, Some(e)));
                }
                deleted.push(*id);
            }
            Ok((deleted, None))
        })
        .await;

        let (deleted, failure) = match result {
            Ok(parts) => parts,
            Err(e) => {
                warn!("Delete threads refused: {}", e);
                return e.into();
            }
        };

        if !deleted.is_empty() {
            let cache = self.engine.cache().clone();
            let ids = deleted.clone();
            spawn_blocking_logged("Cache thread cleanup", move || cache.delete_threads(&ids));
        }

        match failure {
            None => {
                info!("Deleted {} threads", deleted.len());
                ActionOutcome::success(deleted.len())
            }
            Some(e) => {
                warn!(
                    "Deleted {} of {} threads before failure: {}",
                    deleted.len(),
                    thread_ids.len(),
                    e
                );
                ActionOutcome::error_with_code(
                    format!(
                        "Deleted {} of {} conversations: {}",
                        deleted.len(),
                        thread_ids.len(),
                        e
                    ),
                    e.code(),
                )
            }
        }
    }

    /// Delete messages upstream, then from the cache in the background.
    /// Same partial-failure policy as [`Self::delete_threads`].
    pub async fn delete_messages(&self, message_ids: &[i64]) -> ActionOutcome<usize> {
        if message_ids.is_empty() {
            return ActionOutcome::success(0);
        }

        let engine = self.engine.clone();
        let ids = message_ids.to_vec();
        let result = run_blocking(move || {
            let provider = engine.provider();
            if !provider.has_read_permission() {
                return Err(Self::permission_denied());
            }

            let mut deleted = Vec::with_capacity(ids.len());
            for id in &ids {
                if let Err(e) = provider.delete_message(*id) {
                    return Ok((deleted, Some(e)));
                }
                deleted.push(*id);
            }
            Ok((deleted, None))
        })
        .await;

        let (deleted, failure) = match result {
            Ok(parts) => parts,
            Err(e) => return e.into(),
        };

        if !deleted.is_empty() {
            let cache = self.engine.cache().clone();
            let ids = deleted.clone();
            spawn_blocking_logged("Cache message cleanup", move || cache.delete_messages(&ids));
        }

        match failure {
            None => ActionOutcome::success(deleted.len()),
            Some(e) => ActionOutcome::error_with_code(
                format!(
                    "Deleted {} of {} messages: {}",
                    deleted.len(),
                    message_ids.len(),
                    e
                ),
                e.code(),
            ),
        }
    }

    /// Flip unread messages of the thread to read, then refresh the thread
    /// in the background. `data` is the number of rows updated.
    pub async fn mark_thread_as_read(&self, thread_id: i64) -> ActionOutcome<usize> {
        let engine = self.engine.clone();
        let result = run_blocking(move || {
            let provider = engine.provider();
            if !provider.has_read_permission() {
                return Err(Self::permission_denied());
            }
            provider.mark_thread_read(thread_id)
        })
        .await;

        match result {
            Ok(updated) => {
                debug!("Marked {} messages read in thread {}", updated, thread_id);
                let engine = self.engine.clone();
                tokio::spawn(async move {
                    engine.resync_thread(thread_id).await;
                });
                ActionOutcome::success(updated)
            }
            Err(e) => {
                warn!("Failed to mark thread {} read: {}", thread_id, e);
                e.into()
            }
        }
    }

    /// Send a text message and record it in the provider as sent.
    ///
    /// Returns the provider id of the new row. Unlike the bulk operations,
    /// failures propagate.
    pub async fn send_message(
        &self,
        address: &str,
        body: &str,
        subscription_id: Option<i32>,
    ) -> Result<i64> {
        let address = address.trim().to_string();
        if address.is_empty() {
            return Err(SmsError::InvalidInput("Recipient address is empty".to_string()));
        }
        if body.trim().is_empty() {
            return Err(SmsError::InvalidInput("Message body is empty".to_string()));
        }

        let engine = self.engine.clone();
        let transport = self.transport.clone();
        let body = body.to_string();

        let (id, thread_id) = run_blocking(move || {
            let parts = transport.divide_message(&body);
            debug!("Sending {} part(s) to {}", parts.len(), address);
            transport.send_multipart(&address, &parts, subscription_id)?;

            let provider = engine.provider();
            let thread_id = provider.thread_id_for_address(&address)?;
            let id = provider.insert_message(&NewProviderMessage {
                thread_id,
                address,
                body,
                date: now_ms(),
                read: true,
                message_type: MESSAGE_TYPE_SENT,
                subscription_id,
            })?;
            Ok((id, thread_id))
        })
        .await?;

        info!("Sent message {} in thread {}", id, thread_id);
        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.resync_thread(thread_id).await;
        });
        Ok(id)
    }
}
