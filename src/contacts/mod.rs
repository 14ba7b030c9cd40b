//! Contact resolution
//!
//! Maps a sender address to a display name and answers "is this sender a
//! known contact". Lookups go to the [`ContactDirectory`] port and are
//! cached: names in a bounded LRU, unknown flags in a plain map. Both are
//! dropped wholesale once the TTL elapses or on [`ContactResolver::clear`].

use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::ContactCacheConfig;
use crate::provider::{ContactDirectory, ContactEntry};

/// Canonical cache key for an address.
///
/// Strips whitespace and dialing punctuation; a leading `+` and any
/// alphanumeric sender id are kept.
pub fn normalize_address(address: &str) -> String {
    address
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')' | '/'))
        .collect()
}

/// An address with nothing to look up (no letter or digit) is never a contact
fn is_resolvable(address: &str) -> bool {
    address.chars().any(char::is_alphanumeric)
}

/// Cached lookup result. `Absent` records a completed lookup with no name
/// so misses are not repeated.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CachedName {
    Present(String),
    Absent,
}

impl CachedName {
    fn into_option(self) -> Option<String> {
        match self {
            CachedName::Present(name) => Some(name),
            CachedName::Absent => None,
        }
    }
}

struct CacheState {
    names: LruCache<String, CachedName>,
    unknown: HashMap<String, bool>,
    created: Instant,
}

impl CacheState {
    fn expire_if_stale(&mut self, ttl: Duration) {
        if self.created.elapsed() >= ttl {
            if !self.names.is_empty() || !self.unknown.is_empty() {
                debug!(
                    names = self.names.len(),
                    unknown = self.unknown.len(),
                    "Contact cache expired"
                );
            }
            self.names.clear();
            self.unknown.clear();
            self.created = Instant::now();
        }
    }

    fn record(&mut self, key: String, entry: Option<&ContactEntry>) {
        let name = entry
            .and_then(|e| e.display_name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| CachedName::Present(n.to_string()))
            .unwrap_or(CachedName::Absent);

        self.unknown.insert(key.clone(), entry.is_none());
        self.names.put(key, name);
    }
}

pub struct ContactResolver {
    directory: Arc<dyn ContactDirectory>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl ContactResolver {
    pub fn new(directory: Arc<dyn ContactDirectory>, config: &ContactCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            directory,
            ttl: config.ttl(),
            state: Mutex::new(CacheState {
                names: LruCache::new(capacity),
                unknown: HashMap::new(),
                created: Instant::now(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        // A panic mid-update leaves at worst a stale entry; keep serving.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Query the directory and cache the result. Errors are not cached.
    fn lookup(&self, key: &str, address: &str) -> Option<Option<ContactEntry>> {
        match self.directory.lookup(address) {
            Ok(entry) => {
                self.state().record(key.to_string(), entry.as_ref());
                Some(entry)
            }
            Err(e) => {
                warn!("Contact lookup failed for {}: {}", address, e);
                None
            }
        }
    }

    /// Display name for an address, `None` when there is no contact or the
    /// contact has no usable name.
    pub fn resolve_display_name(&self, address: &str) -> Option<String> {
        if !is_resolvable(address) {
            return None;
        }
        let key = normalize_address(address);

        {
            let mut state = self.state();
            state.expire_if_stale(self.ttl);
            if let Some(cached) = state.names.get(&key) {
                return cached.clone().into_option();
            }
        }

        self.lookup(&key, address)?
            .and_then(|entry| entry.display_name)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }

    /// Whether no contact matches the address.
    ///
    /// Unresolvable addresses and directory failures count as unknown.
    pub fn resolve_is_unknown(&self, address: &str) -> bool {
        if !is_resolvable(address) {
            return true;
        }
        let key = normalize_address(address);

        {
            let mut state = self.state();
            state.expire_if_stale(self.ttl);
            if let Some(unknown) = state.unknown.get(&key) {
                return *unknown;
            }
        }

        match self.lookup(&key, address) {
            Some(entry) => entry.is_none(),
            None => true,
        }
    }

    /// The subset of `addresses` that are unknown, as given.
    pub fn resolve_unknown_batch<'a, I>(&self, addresses: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let unique: HashSet<&str> = addresses.into_iter().collect();
        unique
            .into_iter()
            .filter(|address| self.resolve_is_unknown(address))
            .map(str::to_string)
            .collect()
    }

    /// Drop every cached name and unknown flag
    pub fn clear(&self) {
        let mut state = self.state();
        state.names.clear();
        state.unknown.clear();
        state.created = Instant::now();
    }

    pub fn cached_names(&self) -> usize {
        self.state().names.len()
    }
}
