//! # Worker Context
//!
//! Collaborators shared by every task a worker process runs: broker, result
//! cache, registry, object stores and cold-storage client, plus the identity
//! this process stamps onto the work items it leases.

use dashmap::DashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::ResultCache;
use crate::cold_storage::{ColdStorageClient, HttpColdStorageClient};
use crate::config::{ConfigResult, PersistenceConfig, PreservationConfig};
use crate::constants::defaults;
use crate::messaging::MessagingService;
use crate::models::{Institution, ProcessIdentity};
use crate::registry::RegistryClient;
use crate::restoration::{RestorationContext, RestorationError, RestorationResult};
use crate::storage::ObjectStoreRegistry;

pub struct WorkerContext {
    pub broker: Arc<dyn MessagingService>,
    pub cache: Arc<dyn ResultCache>,
    pub restoration: RestorationContext,
    pub identity: ProcessIdentity,
    pub persistence: PersistenceConfig,
    pub keep_alive_interval: Duration,
    institutions: DashMap<i64, Institution>,
    pub(super) persistence_failures: AtomicU64,
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("broker", &self.broker.provider_name())
            .field("cache", &self.cache.provider_name())
            .field("restoration", &self.restoration)
            .field("identity", &self.identity)
            .field("persistence", &self.persistence)
            .field("keep_alive_interval", &self.keep_alive_interval)
            .field("cached_institutions", &self.institutions.len())
            .field("persistence_failures", &self.persistence_failures())
            .finish()
    }
}

impl WorkerContext {
    pub fn new(
        broker: Arc<dyn MessagingService>,
        cache: Arc<dyn ResultCache>,
        restoration: RestorationContext,
        identity: ProcessIdentity,
    ) -> Self {
        Self {
            broker,
            cache,
            restoration,
            identity,
            persistence: PersistenceConfig::default(),
            keep_alive_interval: Duration::from_secs(defaults::KEEP_ALIVE_INTERVAL_SECS),
            institutions: DashMap::new(),
            persistence_failures: AtomicU64::new(0),
        }
    }

    /// Context wired from loaded configuration. Storage and cold-storage
    /// clients are passed in because their transports live outside this crate.
    pub fn from_config(
        config: &PreservationConfig,
        broker: Arc<dyn MessagingService>,
        cache: Arc<dyn ResultCache>,
        registry: Arc<dyn RegistryClient>,
        object_stores: Arc<ObjectStoreRegistry>,
        cold_storage: Arc<dyn ColdStorageClient>,
    ) -> Self {
        let restoration = RestorationContext {
            registry,
            object_stores,
            cold_storage,
            storage_locations: Arc::new(config.storage_locations.clone()),
            config: config.restoration.clone(),
        };
        Self::new(broker, cache, restoration, ProcessIdentity::current())
            .with_persistence(config.persistence.clone())
            .with_keep_alive_interval(config.keep_alive_interval())
    }

    pub fn with_persistence(mut self, persistence: PersistenceConfig) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    pub fn with_identity(mut self, identity: ProcessIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn registry(&self) -> &Arc<dyn RegistryClient> {
        &self.restoration.registry
    }

    /// Institution by id, fetched from the registry once per process
    pub async fn institution(&self, id: i64) -> RestorationResult<Institution> {
        if let Some(cached) = self.institutions.get(&id) {
            return Ok(cached.clone());
        }
        let institution = self
            .registry()
            .institution_get(id)
            .await?
            .ok_or_else(|| RestorationError::missing_record("Institution", id.to_string()))?;
        debug!(institution_id = id, identifier = %institution.identifier, "Cached institution");
        self.institutions.insert(id, institution.clone());
        Ok(institution)
    }
}

/// Signed HTTP cold-storage client for the configured provider
pub fn cold_storage_client_from_config(config: &PreservationConfig) -> ConfigResult<HttpColdStorageClient> {
    let cold = &config.cold_storage;
    let credentials = config.credentials_for(&cold.provider)?;
    Ok(HttpColdStorageClient::new(
        cold.provider.clone(),
        credentials,
        cold.region.clone(),
        cold.days,
        cold.tier.clone(),
    ))
}
