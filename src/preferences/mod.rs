//! Preference store
//!
//! User-owned thread state (archived, pinned, muted), blocked senders,
//! theme and the auto-archive flag. Sets live as comma-joined strings in
//! the `settings` table, one key per set, and change only through an
//! atomic read-modify-write. Every effective change publishes a fresh
//! [`PreferenceSnapshot`].

use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::adapters::sqlite::settings::{get_setting, update_setting};
use crate::adapters::sqlite::DbPool;
use crate::error::SmsError;
use crate::sync::feed::ChangeFeed;
use crate::types::{PreferenceSnapshot, Theme};

pub const KEY_ARCHIVED: &str = "archived_threads";
pub const KEY_PINNED: &str = "pinned_threads";
pub const KEY_MUTED: &str = "muted_threads";
pub const KEY_BLOCKED: &str = "blocked_addresses";
pub const KEY_THEME: &str = "theme";
pub const KEY_AUTO_ARCHIVE_UNKNOWN: &str = "auto_archive_unknown";

/// Decode a comma-joined set, skipping blank and malformed entries.
pub fn decode_set<T>(value: Option<&str>) -> BTreeSet<T>
where
    T: FromStr + Ord,
{
    let Some(value) = value else {
        return BTreeSet::new();
    };

    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| match item.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!("Skipping malformed preference entry: {}", item);
                None
            }
        })
        .collect()
}

pub fn encode_set<T: Display>(set: &BTreeSet<T>) -> String {
    set.iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_flag(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("true") | Some("1"))
}

/// Which thread-id set an edit targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadSet {
    Archived,
    Pinned,
    Muted,
}

impl ThreadSet {
    fn key(self) -> &'static str {
        match self {
            ThreadSet::Archived => KEY_ARCHIVED,
            ThreadSet::Pinned => KEY_PINNED,
            ThreadSet::Muted => KEY_MUTED,
        }
    }
}

pub struct PreferenceStore {
    pool: DbPool,
    // Serializes edit + publish so subscribers see snapshots in commit order
    edit_lock: Mutex<()>,
    changes: ChangeFeed<PreferenceSnapshot>,
}

impl PreferenceStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            edit_lock: Mutex::new(()),
            changes: ChangeFeed::new(),
        }
    }

    /// Receive a snapshot after every effective change
    pub fn subscribe(&self) -> flume::Receiver<PreferenceSnapshot> {
        self.changes.subscribe()
    }

    pub fn snapshot(&self) -> Result<PreferenceSnapshot, SmsError> {
        let get = |key: &str| get_setting(&self.pool, key);

        Ok(PreferenceSnapshot {
            archived_threads: decode_set(get(KEY_ARCHIVED)?.as_deref()),
            pinned_threads: decode_set(get(KEY_PINNED)?.as_deref()),
            muted_threads: decode_set(get(KEY_MUTED)?.as_deref()),
            blocked_addresses: decode_set(get(KEY_BLOCKED)?.as_deref()),
            theme: get(KEY_THEME)?
                .as_deref()
                .map(Theme::parse)
                .unwrap_or_default(),
            auto_archive_unknown: parse_flag(get(KEY_AUTO_ARCHIVE_UNKNOWN)?.as_deref()),
        })
    }

    pub fn thread_set(&self, set: ThreadSet) -> Result<BTreeSet<i64>, SmsError> {
        Ok(decode_set(get_setting(&self.pool, set.key())?.as_deref()))
    }

    pub fn archived_threads(&self) -> Result<BTreeSet<i64>, SmsError> {
        self.thread_set(ThreadSet::Archived)
    }

    pub fn blocked_addresses(&self) -> Result<BTreeSet<String>, SmsError> {
        Ok(decode_set(get_setting(&self.pool, KEY_BLOCKED)?.as_deref()))
    }

    pub fn theme(&self) -> Result<Theme, SmsError> {
        Ok(get_setting(&self.pool, KEY_THEME)?
            .as_deref()
            .map(Theme::parse)
            .unwrap_or_default())
    }

    pub fn auto_archive_unknown(&self) -> Result<bool, SmsError> {
        Ok(parse_flag(
            get_setting(&self.pool, KEY_AUTO_ARCHIVE_UNKNOWN)?.as_deref(),
        ))
    }

    /// Atomically edit one stored set. Returns whether its contents changed.
    fn edit_set<T, F>(&self, key: &str, edit: F) -> Result<bool, SmsError>
    where
        T: FromStr + Ord + Display,
        F: FnOnce(&mut BTreeSet<T>),
    {
        let _guard = self.edit_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut changed = false;
        update_setting(&self.pool, key, |current| {
            let before: BTreeSet<T> = decode_set(current);
            let mut after = decode_set(current);
            edit(&mut after);
            changed = before != after;
            encode_set(&after)
        })?;

        if changed {
            debug!("Preference '{}' updated", key);
            self.publish()?;
        }
        Ok(changed)
    }

    fn edit_value(&self, key: &str, value: &str) -> Result<bool, SmsError> {
        let _guard = self.edit_lock.lock().unwrap_or_else(|e| e.into_inner());

        let (old, new) = update_setting(&self.pool, key, |_| value.to_string())?;
        let changed = old.as_deref() != Some(new.as_str());
        if changed {
            debug!("Preference '{}' set to {}", key, new);
            self.publish()?;
        }
        Ok(changed)
    }

    fn publish(&self) -> Result<(), SmsError> {
        let snapshot = self.snapshot()?;
        self.changes.publish(snapshot);
        Ok(())
    }

    pub fn add_threads(&self, set: ThreadSet, thread_ids: &[i64]) -> Result<bool, SmsError> {
        self.edit_set(set.key(), |ids: &mut BTreeSet<i64>| {
            ids.extend(thread_ids.iter().copied())
        })
    }

    pub fn remove_threads(&self, set: ThreadSet, thread_ids: &[i64]) -> Result<bool, SmsError> {
        self.edit_set(set.key(), |ids: &mut BTreeSet<i64>| {
            for id in thread_ids {
                ids.remove(id);
            }
        })
    }

    pub fn add_archived(&self, thread_ids: &[i64]) -> Result<bool, SmsError> {
        self.add_threads(ThreadSet::Archived, thread_ids)
    }

    pub fn remove_archived(&self, thread_ids: &[i64]) -> Result<bool, SmsError> {
        self.remove_threads(ThreadSet::Archived, thread_ids)
    }

    pub fn block_addresses(&self, addresses: &[String]) -> Result<bool, SmsError> {
        self.edit_set(KEY_BLOCKED, |blocked: &mut BTreeSet<String>| {
            blocked.extend(
                addresses
                    .iter()
                    .map(|a| a.trim())
                    .filter(|a| !a.is_empty() && !a.contains(','))
                    .map(str::to_string),
            )
        })
    }

    pub fn unblock_addresses(&self, addresses: &[String]) -> Result<bool, SmsError> {
        self.edit_set(KEY_BLOCKED, |blocked: &mut BTreeSet<String>| {
            for address in addresses {
                blocked.remove(address.trim());
            }
        })
    }

    pub fn set_theme(&self, theme: Theme) -> Result<bool, SmsError> {
        self.edit_value(KEY_THEME, theme.as_str())
    }

    pub fn set_auto_archive_unknown(&self, enabled: bool) -> Result<bool, SmsError> {
        self.edit_value(KEY_AUTO_ARCHIVE_UNKNOWN, if enabled { "true" } else { "false" })
    }
}
