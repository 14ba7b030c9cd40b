//! Provider-to-cache synchronization
//!
//! The system SMS provider is the source of truth; the local cache is a
//! mirror that is brought up to date incrementally, gated on the newest
//! `last_sync_timestamp` stored per scope.

pub mod debounce;
pub mod engine;
pub mod feed;
pub mod observer;

pub use engine::{SyncEngine, SyncOutcome, SyncStats};
pub use observer::{ChangeObserver, ObserverScope};
