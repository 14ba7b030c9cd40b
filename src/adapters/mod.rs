//! Storage adapters
//!
//! The only local storage is SQLite; the system SMS provider, transport
//! and contact directory are reached through the ports in `provider`.

pub mod sqlite;
