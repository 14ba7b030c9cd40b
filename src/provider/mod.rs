//! Ports to the platform
//!
//! - [`SmsProvider`]: the system-owned SMS store (threads, messages,
//!   change notifications). Not modifiable by us beyond insert/update/delete.
//! - [`SmsTransport`]: the platform's multipart send API.
//! - [`ContactDirectory`]: read-only contact lookup by address.
//!
//! All calls are blocking; callers run them on the blocking pool.

pub mod memory;
pub mod split;

use serde::{Deserialize, Serialize};

use crate::error::SmsError;

pub use memory::{MemoryContacts, MemoryProvider, MemoryTransport};

/// Provider type column value for received messages
pub const MESSAGE_TYPE_INBOX: i32 = 1;
/// Provider type column value for sent messages
pub const MESSAGE_TYPE_SENT: i32 = 2;

/// Row of the provider's conversation index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderThread {
    pub thread_id: i64,
    pub snippet: String,
    /// Date of the newest message in the thread (epoch ms)
    pub date: i64,
}

/// Newest message of a thread, as returned by the detail query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadDetail {
    pub thread_id: i64,
    pub address: String,
    pub date: i64,
    pub read: bool,
}

/// Row of the provider's message table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub id: i64,
    pub thread_id: i64,
    pub address: String,
    pub body: String,
    pub date: i64,
    pub read: bool,
    pub message_type: i32,
    pub subscription_id: i32,
}

/// Values for a locally written outgoing row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProviderMessage {
    pub thread_id: i64,
    pub address: String,
    pub body: String,
    pub date: i64,
    pub read: bool,
    pub message_type: i32,
    pub subscription_id: Option<i32>,
}

/// Change notification from the provider.
///
/// `thread_id` is `None` when the provider cannot scope the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderChange {
    pub thread_id: Option<i64>,
}

impl ProviderChange {
    pub fn all() -> Self {
        Self { thread_id: None }
    }

    pub fn thread(thread_id: i64) -> Self {
        Self {
            thread_id: Some(thread_id),
        }
    }

    /// Whether an observer scoped to `thread_id` should react
    pub fn affects_thread(&self, thread_id: i64) -> bool {
        self.thread_id.map_or(true, |id| id == thread_id)
    }
}

pub trait SmsProvider: Send + Sync {
    /// Whether the app currently holds read access to the SMS store
    fn has_read_permission(&self) -> bool;

    /// Threads whose newest message is newer than `since`, newest first.
    fn query_threads(
        &self,
        since: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<ProviderThread>, SmsError>;

    /// Newest-message detail for every listed thread, in one query.
    fn query_thread_details(&self, thread_ids: &[i64]) -> Result<Vec<ThreadDetail>, SmsError>;

    /// Newest-message detail for one thread
    fn query_thread_detail(&self, thread_id: i64) -> Result<Option<ThreadDetail>, SmsError>;

    /// Every thread id currently present upstream
    fn query_thread_ids(&self) -> Result<Vec<i64>, SmsError>;

    /// Messages of a thread newer than `since`, oldest first
    fn query_messages(
        &self,
        thread_id: i64,
        since: Option<i64>,
    ) -> Result<Vec<ProviderMessage>, SmsError>;

    /// Delete every row of a thread; returns rows removed
    fn delete_thread(&self, thread_id: i64) -> Result<usize, SmsError>;

    fn delete_message(&self, id: i64) -> Result<usize, SmsError>;

    /// Set `read = 1` where `read = 0` for the thread; returns rows updated
    fn mark_thread_read(&self, thread_id: i64) -> Result<usize, SmsError>;

    /// Insert a row and return its id
    fn insert_message(&self, message: &NewProviderMessage) -> Result<i64, SmsError>;

    /// Thread id for an address, allocating one if the address is new
    fn thread_id_for_address(&self, address: &str) -> Result<i64, SmsError>;

    /// Register a change observer. Dropping the receiver unregisters it.
    fn subscribe_changes(&self) -> flume::Receiver<ProviderChange>;
}

pub trait SmsTransport: Send + Sync {
    /// Split a body into the parts the network will carry
    fn divide_message(&self, body: &str) -> Vec<String> {
        split::divide_message(body)
    }

    /// Send all parts as one multipart message. `None` uses the default
    /// subscription.
    fn send_multipart(
        &self,
        address: &str,
        parts: &[String],
        subscription_id: Option<i32>,
    ) -> Result<(), SmsError>;
}

/// Contact directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEntry {
    pub id: i64,
    pub display_name: Option<String>,
}

pub trait ContactDirectory: Send + Sync {
    fn lookup(&self, address: &str) -> Result<Option<ContactEntry>, SmsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_scope() {
        assert!(ProviderChange::all().affects_thread(4));
        assert!(ProviderChange::thread(4).affects_thread(4));
        assert!(!ProviderChange::thread(5).affects_thread(4));
    }
}
