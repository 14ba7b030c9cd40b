//! Provider change observation
//!
//! Listens to the provider's change notifications and re-runs the
//! matching sync once notifications stop arriving for the debounce window.
//! Conversation-level observers sync the conversation list; thread-level
//! observers sync one thread's messages and ignore changes scoped to other
//! threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::debounce::settle;
use super::engine::SyncEngine;
use crate::provider::ProviderChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverScope {
    Conversations,
    Thread(i64),
}

impl ObserverScope {
    fn matches(self, change: &ProviderChange) -> bool {
        match self {
            ObserverScope::Conversations => true,
            ObserverScope::Thread(thread_id) => change.affects_thread(thread_id),
        }
    }
}

/// Running observer. Stops when dropped.
pub struct ChangeObserver {
    scope: ObserverScope,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ChangeObserver {
    /// Register with the provider and start observing. Must be called from
    /// within a tokio runtime.
    pub fn start(engine: SyncEngine, scope: ObserverScope) -> Self {
        let window = match scope {
            ObserverScope::Conversations => engine.config().conversation_debounce(),
            ObserverScope::Thread(_) => engine.config().message_debounce(),
        };
        let changes = engine.provider().subscribe_changes();
        let running = Arc::new(AtomicBool::new(true));

        info!("Starting change observer: {:?}", scope);
        let task = tokio::spawn(observe(
            engine,
            scope,
            window,
            changes,
            running.clone(),
        ));

        Self {
            scope,
            running,
            task,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Stop observing. A sync already in flight is left to finish.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Stopping change observer: {:?}", self.scope);
        }
        self.task.abort();
    }
}

impl Drop for ChangeObserver {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn next_relevant(changes: &flume::Receiver<ProviderChange>, scope: ObserverScope) -> bool {
    loop {
        match changes.recv_async().await {
            Ok(change) if scope.matches(&change) => return true,
            Ok(_) => continue,
            Err(_) => return false,
        }
    }
}

async fn observe(
    engine: SyncEngine,
    scope: ObserverScope,
    window: Duration,
    changes: flume::Receiver<ProviderChange>,
    running: Arc<AtomicBool>,
) {
    let changes = &changes;

    while running.load(Ordering::SeqCst) {
        if !next_relevant(changes, scope).await {
            break;
        }

        let alive = settle(window, move || next_relevant(changes, scope)).await;
        if !running.load(Ordering::SeqCst) {
            break;
        }

        debug!("Provider changes settled, syncing {:?}", scope);
        match scope {
            ObserverScope::Conversations => engine.sync_conversations().await,
            ObserverScope::Thread(thread_id) => engine.sync_messages(thread_id).await,
        };

        if !alive {
            break;
        }
    }

    running.store(false, Ordering::SeqCst);
    debug!("Change observer exited: {:?}", scope);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::LocalCache;
    use crate::config::{ContactCacheConfig, SyncConfig};
    use crate::contacts::ContactResolver;
    use crate::provider::{MemoryContacts, MemoryProvider};

    fn engine(provider: Arc<MemoryProvider>) -> SyncEngine {
        let contacts = Arc::new(ContactResolver::new(
            Arc::new(MemoryContacts::new()),
            &ContactCacheConfig::default(),
        ));
        let config = SyncConfig {
            conversation_debounce_ms: 60,
            message_debounce_ms: 60,
            ..SyncConfig::default()
        };
        SyncEngine::new(provider, LocalCache::in_memory().unwrap(), contacts, config)
    }

    #[tokio::test]
    async fn test_burst_triggers_one_sync() {
        let provider = Arc::new(MemoryProvider::new());
        let engine = engine(provider.clone());
        let observer = ChangeObserver::start(engine.clone(), ObserverScope::Conversations);

        provider.push_incoming("+15550001", "a", 1_000);
        provider.push_incoming("+15550002", "b", 2_000);
        provider.push_incoming("+15550003", "c", 3_000);

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(observer.is_running());
        assert_eq!(engine.cache().fetch_conversations().unwrap().len(), 3);
        assert_eq!(provider.detail_batches().len(), 1);
    }

    #[tokio::test]
    async fn test_thread_observer_ignores_other_threads() {
        let provider = Arc::new(MemoryProvider::new());
        let (_, watched) = provider.push_incoming("+15550001", "a", 1_000);
        let (_, other) = provider.push_incoming("+15550002", "b", 2_000);
        let engine = engine(provider.clone());
        let _observer = ChangeObserver::start(engine.clone(), ObserverScope::Thread(watched));

        provider.push_incoming("+15550002", "c", 3_000);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(engine.cache().fetch_thread_messages(watched).unwrap().is_empty());

        provider.push_incoming("+15550001", "d", 4_000);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(engine.cache().fetch_thread_messages(watched).unwrap().len(), 2);
        assert!(engine.cache().fetch_thread_messages(other).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unscoped_change_wakes_thread_observer() {
        let provider = Arc::new(MemoryProvider::new());
        let (_, watched) = provider.push_incoming("+15550001", "a", 1_000);
        let engine = engine(provider.clone());
        let _observer = ChangeObserver::start(engine.clone(), ObserverScope::Thread(watched));

        // a change the provider could not attribute to a thread
        provider.notify(ProviderChange::all());
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(engine.cache().fetch_thread_messages(watched).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_drop_unregisters_from_provider() {
        let provider = Arc::new(MemoryProvider::new());
        let observer = ChangeObserver::start(engine(provider.clone()), ObserverScope::Conversations);
        assert_eq!(provider.observer_count(), 1);

        drop(observer);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(provider.observer_count(), 0);
    }
}
