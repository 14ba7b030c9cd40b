//! In-memory platform ports
//!
//! Behave like the system provider for the queries the sync layer issues,
//! with switches for permission loss and injected failures. Used by the
//! test suite and by hosts that want to run the core without a device.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{
    ContactDirectory, ContactEntry, NewProviderMessage, ProviderChange, ProviderMessage,
    ProviderThread, SmsProvider, SmsTransport, ThreadDetail, MESSAGE_TYPE_INBOX,
};
use crate::contacts::normalize_address;
use crate::error::SmsError;
use crate::sync::feed::ChangeFeed;

#[derive(Default)]
struct ProviderState {
    messages: BTreeMap<i64, ProviderMessage>,
    threads_by_address: HashMap<String, i64>,
    next_message_id: i64,
    next_thread_id: i64,
    failing_threads: HashSet<i64>,
    fail_queries: bool,
    detail_batches: Vec<Vec<i64>>,
}

pub struct MemoryProvider {
    state: Mutex<ProviderState>,
    read_permission: AtomicBool,
    changes: ChangeFeed<ProviderChange>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProviderState {
                next_message_id: 1,
                next_thread_id: 1,
                ..Default::default()
            }),
            read_permission: AtomicBool::new(true),
            changes: ChangeFeed::new(),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, ProviderState>, SmsError> {
        self.state
            .lock()
            .map_err(|e| SmsError::Provider(format!("Provider state poisoned: {e}")))
    }

    pub fn set_read_permission(&self, granted: bool) {
        self.read_permission.store(granted, Ordering::SeqCst);
    }

    /// Make every query fail until cleared
    pub fn set_fail_queries(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_queries = fail;
        }
    }

    /// Make `delete_thread` fail for this thread
    pub fn fail_delete_for(&self, thread_id: i64) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_threads.insert(thread_id);
        }
    }

    /// Simulate an incoming (or outgoing) message landing in the store.
    /// Returns `(message_id, thread_id)` and notifies observers.
    pub fn push_message(
        &self,
        address: &str,
        body: &str,
        date: i64,
        message_type: i32,
        read: bool,
    ) -> (i64, i64) {
        let (id, thread_id) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let thread_id = allocate_thread(&mut state, address);
            let id = state.next_message_id;
            state.next_message_id += 1;
            state.messages.insert(
                id,
                ProviderMessage {
                    id,
                    thread_id,
                    address: address.to_string(),
                    body: body.to_string(),
                    date,
                    read,
                    message_type,
                    subscription_id: -1,
                },
            );
            (id, thread_id)
        };
        self.changes.publish(ProviderChange::thread(thread_id));
        (id, thread_id)
    }

    pub fn push_incoming(&self, address: &str, body: &str, date: i64) -> (i64, i64) {
        self.push_message(address, body, date, MESSAGE_TYPE_INBOX, false)
    }

    pub fn message(&self, id: i64) -> Option<ProviderMessage> {
        self.state.lock().ok()?.messages.get(&id).cloned()
    }

    pub fn thread_messages(&self, thread_id: i64) -> Vec<ProviderMessage> {
        self.state
            .lock()
            .map(|state| {
                state
                    .messages
                    .values()
                    .filter(|m| m.thread_id == thread_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Thread id lists passed to each batched detail query, in call order
    pub fn detail_batches(&self) -> Vec<Vec<i64>> {
        self.state
            .lock()
            .map(|state| state.detail_batches.clone())
            .unwrap_or_default()
    }

    pub fn observer_count(&self) -> usize {
        self.changes.subscriber_count()
    }

    /// Emit a change notification without touching any row
    pub fn notify(&self, change: ProviderChange) {
        self.changes.publish(change);
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn allocate_thread(state: &mut ProviderState, address: &str) -> i64 {
    let key = normalize_address(address);
    if let Some(id) = state.threads_by_address.get(&key) {
        return *id;
    }
    let id = state.next_thread_id;
    state.next_thread_id += 1;
    state.threads_by_address.insert(key, id);
    id
}

fn newest_per_thread(state: &ProviderState) -> HashMap<i64, &ProviderMessage> {
    let mut newest: HashMap<i64, &ProviderMessage> = HashMap::new();
    for msg in state.messages.values() {
        newest
            .entry(msg.thread_id)
            .and_modify(|current| {
                if (msg.date, msg.id) > (current.date, current.id) {
                    *current = msg;
                }
            })
            .or_insert(msg);
    }
    newest
}

fn detail_of(msg: &ProviderMessage) -> ThreadDetail {
    ThreadDetail {
        thread_id: msg.thread_id,
        address: msg.address.clone(),
        date: msg.date,
        read: msg.read,
    }
}

impl SmsProvider for MemoryProvider {
    fn has_read_permission(&self) -> bool {
        self.read_permission.load(Ordering::SeqCst)
    }

    fn query_threads(
        &self,
        since: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<ProviderThread>, SmsError> {
        let state = self.state()?;
        if state.fail_queries {
            return Err(SmsError::Provider("query failed".to_string()));
        }

        let mut threads: Vec<ProviderThread> = newest_per_thread(&state)
            .into_values()
            .filter(|msg| since.map_or(true, |since| msg.date > since))
            .map(|msg| ProviderThread {
                thread_id: msg.thread_id,
                snippet: msg.body.clone(),
                date: msg.date,
            })
            .collect();

        threads.sort_by(|a, b| b.date.cmp(&a.date).then(b.thread_id.cmp(&a.thread_id)));
        if let Some(limit) = limit {
            threads.truncate(limit);
        }
        Ok(threads)
    }

    fn query_thread_details(&self, thread_ids: &[i64]) -> Result<Vec<ThreadDetail>, SmsError> {
        let mut state = self.state()?;
        if state.fail_queries {
            return Err(SmsError::Provider("query failed".to_string()));
        }
        state.detail_batches.push(thread_ids.to_vec());

        let wanted: HashSet<i64> = thread_ids.iter().copied().collect();
        let mut details: Vec<ThreadDetail> = newest_per_thread(&state)
            .into_values()
            .filter(|msg| wanted.contains(&msg.thread_id))
            .map(detail_of)
            .collect();
        details.sort_by_key(|d| d.thread_id);
        Ok(details)
    }

    fn query_thread_detail(&self, thread_id: i64) -> Result<Option<ThreadDetail>, SmsError> {
        let state = self.state()?;
        if state.fail_queries {
            return Err(SmsError::Provider("query failed".to_string()));
        }

        let newest = state
            .messages
            .values()
            .filter(|msg| msg.thread_id == thread_id)
            .max_by_key(|msg| (msg.date, msg.id));
        Ok(newest.map(detail_of))
    }

    fn query_thread_ids(&self) -> Result<Vec<i64>, SmsError> {
        let state = self.state()?;
        if state.fail_queries {
            return Err(SmsError::Provider("query failed".to_string()));
        }
        let mut ids: Vec<i64> = state.messages.values().map(|m| m.thread_id).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn query_messages(
        &self,
        thread_id: i64,
        since: Option<i64>,
    ) -> Result<Vec<ProviderMessage>, SmsError> {
        let state = self.state()?;
        if state.fail_queries {
            return Err(SmsError::Provider("query failed".to_string()));
        }

        let mut messages: Vec<ProviderMessage> = state
            .messages
            .values()
            .filter(|msg| msg.thread_id == thread_id)
            .filter(|msg| since.map_or(true, |since| msg.date > since))
            .cloned()
            .collect();
        messages.sort_by_key(|msg| (msg.date, msg.id));
        Ok(messages)
    }

    fn delete_thread(&self, thread_id: i64) -> Result<usize, SmsError> {
        let removed = {
            let mut state = self.state()?;
            if state.failing_threads.contains(&thread_id) {
                return Err(SmsError::Provider(format!(
                    "Failed to delete thread {thread_id}"
                )));
            }
            let before = state.messages.len();
            state.messages.retain(|_, msg| msg.thread_id != thread_id);
            before - state.messages.len()
        };
        self.changes.publish(ProviderChange::thread(thread_id));
        Ok(removed)
    }

    fn delete_message(&self, id: i64) -> Result<usize, SmsError> {
        let removed = self.state()?.messages.remove(&id);
        match removed {
            Some(msg) => {
                self.changes.publish(ProviderChange::thread(msg.thread_id));
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn mark_thread_read(&self, thread_id: i64) -> Result<usize, SmsError> {
        let updated = {
            let mut state = self.state()?;
            let mut updated = 0;
            for msg in state.messages.values_mut() {
                if msg.thread_id == thread_id && !msg.read {
                    msg.read = true;
                    updated += 1;
                }
            }
            updated
        };
        if updated > 0 {
            self.changes.publish(ProviderChange::thread(thread_id));
        }
        Ok(updated)
    }

    fn insert_message(&self, message: &NewProviderMessage) -> Result<i64, SmsError> {
        let id = {
            let mut state = self.state()?;
            let id = state.next_message_id;
            state.next_message_id += 1;
            state.messages.insert(
                id,
                ProviderMessage {
                    id,
                    thread_id: message.thread_id,
                    address: message.address.clone(),
                    body: message.body.clone(),
                    date: message.date,
                    read: message.read,
                    message_type: message.message_type,
                    subscription_id: message.subscription_id.unwrap_or(-1),
                },
            );
            id
        };
        self.changes.publish(ProviderChange::thread(message.thread_id));
        Ok(id)
    }

    fn thread_id_for_address(&self, address: &str) -> Result<i64, SmsError> {
        let mut state = self.state()?;
        Ok(allocate_thread(&mut state, address))
    }

    fn subscribe_changes(&self) -> flume::Receiver<ProviderChange> {
        self.changes.subscribe()
    }
}

/// One call to [`SmsTransport::send_multipart`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentParts {
    pub address: String,
    pub parts: Vec<String>,
    pub subscription_id: Option<i32>,
}

#[derive(Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<SentParts>>,
    rejected: Mutex<HashSet<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends to this address will fail
    pub fn reject_address(&self, address: &str) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.insert(normalize_address(address));
        }
    }

    pub fn sent(&self) -> Vec<SentParts> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl SmsTransport for MemoryTransport {
    fn send_multipart(
        &self,
        address: &str,
        parts: &[String],
        subscription_id: Option<i32>,
    ) -> Result<(), SmsError> {
        let rejected = self
            .rejected
            .lock()
            .map(|r| r.contains(&normalize_address(address)))
            .unwrap_or(false);
        if rejected {
            return Err(SmsError::Send(format!("Network rejected message to {address}")));
        }

        self.sent
            .lock()
            .map_err(|e| SmsError::Send(e.to_string()))?
            .push(SentParts {
                address: address.to_string(),
                parts: parts.to_vec(),
                subscription_id,
            });
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryContacts {
    entries: Mutex<HashMap<String, ContactEntry>>,
    lookups: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryContacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_contact(&self, address: &str, display_name: Option<&str>) {
        if let Ok(mut entries) = self.entries.lock() {
            let id = entries.len() as i64 + 1;
            entries.insert(
                normalize_address(address),
                ContactEntry {
                    id,
                    display_name: display_name.map(str::to_string),
                },
            );
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of lookups that reached the directory
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ContactDirectory for MemoryContacts {
    fn lookup(&self, address: &str) -> Result<Option<ContactEntry>, SmsError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SmsError::Provider("contacts unavailable".to_string()));
        }
        let entries = self
            .entries
            .lock()
            .map_err(|e| SmsError::Provider(e.to_string()))?;
        Ok(entries.get(&normalize_address(address)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threads_are_grouped_by_address() {
        let provider = MemoryProvider::new();
        let (_, a) = provider.push_incoming("+1 555 0001", "one", 100);
        let (_, a2) = provider.push_incoming("+15550001", "two", 200);
        let (_, b) = provider.push_incoming("+15550002", "three", 150);

        assert_eq!(a, a2);
        assert_ne!(a, b);

        let threads = provider.query_threads(None, None).unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].thread_id, a);
        assert_eq!(threads[0].snippet, "two");
    }

    #[test]
    fn test_since_and_limit_filters() {
        let provider = MemoryProvider::new();
        provider.push_incoming("+1", "a", 100);
        provider.push_incoming("+2", "b", 200);
        provider.push_incoming("+3", "c", 300);

        assert_eq!(provider.query_threads(Some(150), None).unwrap().len(), 2);
        let limited = provider.query_threads(None, Some(1)).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].date, 300);
    }

    #[test]
    fn test_mark_read_only_touches_unread() {
        let provider = MemoryProvider::new();
        let (_, thread) = provider.push_incoming("+1", "a", 100);
        provider.push_message("+1", "b", 200, MESSAGE_TYPE_INBOX, true);

        assert_eq!(provider.mark_thread_read(thread).unwrap(), 1);
        assert_eq!(provider.mark_thread_read(thread).unwrap(), 0);
    }

    #[test]
    fn test_contacts_lookup_normalizes() {
        let contacts = MemoryContacts::new();
        contacts.add_contact("+1 (555) 000-1", Some("Alice"));

        let entry = contacts.lookup("+15550001").unwrap().unwrap();
        assert_eq!(entry.display_name.as_deref(), Some("Alice"));
        assert_eq!(contacts.lookup_count(), 1);
    }
}
