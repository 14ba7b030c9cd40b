//! Application state
//!
//! Wires the cache, preference store, contact resolver, sync engine and
//! repository together from configuration and the three platform ports.
//! A host builds one [`AppState`] at startup and shares it.

use std::sync::Arc;
use tracing::info;

use crate::adapters::sqlite::LocalCache;
use crate::config::{self, AppConfig};
use crate::contacts::ContactResolver;
use crate::error::Result;
use crate::preferences::PreferenceStore;
use crate::provider::{ContactDirectory, SmsProvider, SmsTransport};
use crate::services::MessageRepository;
use crate::sync::SyncEngine;

#[derive(Clone)]
pub struct AppState {
    pub cache: LocalCache,
    pub preferences: Arc<PreferenceStore>,
    pub contacts: Arc<ContactResolver>,
    pub engine: SyncEngine,
    pub repository: MessageRepository,
}

impl AppState {
    /// Open the on-disk cache named by `config` and build every service.
    pub fn initialize(
        config: &AppConfig,
        provider: Arc<dyn SmsProvider>,
        transport: Arc<dyn SmsTransport>,
        directory: Arc<dyn ContactDirectory>,
    ) -> Result<Self> {
        let db_path = config.db_path()?;
        info!("Opening local cache at {:?}", db_path);
        let cache = LocalCache::open(&db_path)?;
        Ok(Self::assemble(config, cache, provider, transport, directory))
    }

    /// Same as [`AppState::initialize`] using the global configuration.
    pub fn from_global_config(
        provider: Arc<dyn SmsProvider>,
        transport: Arc<dyn SmsTransport>,
        directory: Arc<dyn ContactDirectory>,
    ) -> Result<Self> {
        let config = config::get_config()?;
        Self::initialize(&config, provider, transport, directory)
    }

    /// Build on an in-memory cache (for testing)
    pub fn in_memory(
        config: &AppConfig,
        provider: Arc<dyn SmsProvider>,
        transport: Arc<dyn SmsTransport>,
        directory: Arc<dyn ContactDirectory>,
    ) -> Result<Self> {
        let cache = LocalCache::in_memory()?;
        Ok(Self::assemble(config, cache, provider, transport, directory))
    }

    fn assemble(
        config: &AppConfig,
        cache: LocalCache,
        provider: Arc<dyn SmsProvider>,
        transport: Arc<dyn SmsTransport>,
        directory: Arc<dyn ContactDirectory>,
    ) -> Self {
        let preferences = Arc::new(PreferenceStore::new(cache.pool().clone()));
        let contacts = Arc::new(ContactResolver::new(directory, &config.contacts));
        let engine = SyncEngine::new(provider, cache.clone(), contacts.clone(), config.sync.clone());
        let repository = MessageRepository::new(engine.clone(), preferences.clone(), transport);

        Self {
            cache,
            preferences,
            contacts,
            engine,
            repository,
        }
    }
}
