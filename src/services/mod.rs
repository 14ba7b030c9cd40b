//! Service layer
//!
//! The repository composes the sync engine, the local cache, the
//! preference store and the contact resolver into the operations a UI
//! calls: reactive read streams and imperative writes.

pub mod helpers;
pub mod repository;

pub use repository::{ConversationStream, MessageRepository, MessageStream, Subscription};
