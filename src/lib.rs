//! SMS sync core
//!
//! Mirrors the system SMS provider into a local SQLite cache and exposes
//! conversations and messages as live subscriptions, with the write
//! operations a messaging UI needs (send, archive, mute, block, delete).
//!
//! ## Module Organization
//!
//! - `provider/`: ports to the platform (SMS store, send API, contacts)
//! - `adapters/`: SQLite local cache and settings table
//! - `contacts/`: cached address-to-contact resolution
//! - `preferences/`: archived/pinned/muted sets, blocked senders, theme
//! - `sync/`: sync engine, change observers, debounce
//! - `services/`: the repository composing all of the above
//! - `state/`: wiring from configuration
//! - `config/`: TOML configuration
//! - `types/`: data structures and outcomes

pub mod adapters;
pub mod config;
pub mod contacts;
pub mod error;
pub mod preferences;
pub mod provider;
pub mod services;
pub mod state;
pub mod sync;
pub mod types;

use tracing_subscriber::EnvFilter;

pub use error::{Result, SmsError};
pub use services::{ConversationStream, MessageRepository, MessageStream};
pub use state::AppState;
pub use sync::{SyncEngine, SyncOutcome};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise debug builds log this crate at
/// debug and everything else at info; release builds log info and above.
/// Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("sms_sync_lib=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
