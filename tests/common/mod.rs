//! Shared fixtures for integration tests. Everything runs against the
//! in-memory collaborators.

#![allow(dead_code)]

pub mod builders;

pub use builders::*;

use std::sync::Arc;
use std::time::Duration;

use preservation_core::cache::InMemoryResultCache;
use preservation_core::cold_storage::InMemoryColdStorageClient;
use preservation_core::config::{PersistenceConfig, RestorationConfig};
use preservation_core::constants::topics;
use preservation_core::messaging::InMemoryMessagingService;
use preservation_core::models::{ProcessIdentity, StorageLocation};
use preservation_core::registry::InMemoryRegistry;
use preservation_core::restoration::RestorationContext;
use preservation_core::storage::{InMemoryObjectStore, ObjectStoreRegistry};
use preservation_core::worker::{
    EngineStatsSnapshot, WorkerCapability, WorkerContext, WorkerEngine, WorkerSettings,
};
use tokio_util::sync::CancellationToken;

pub const HOST: &str = "worker-host-1";
pub const PID: u32 = 4242;

/// In-memory collaborators wired the way a worker process wires the real ones
pub struct TestEnvironment {
    pub registry: Arc<InMemoryRegistry>,
    pub broker: Arc<InMemoryMessagingService>,
    pub cache: Arc<InMemoryResultCache>,
    pub cold_storage: Arc<InMemoryColdStorageClient>,
    pub object_stores: ObjectStoreRegistry,
    pub storage_locations: Vec<StorageLocation>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(InMemoryRegistry::new()),
            broker: Arc::new(InMemoryMessagingService::with_queues(&[
                topics::RESTORE_OBJECT,
                topics::RESTORE_FILE,
                topics::RESTORE_GLACIER,
                topics::FIXITY_CHECK,
            ])),
            cache: Arc::new(InMemoryResultCache::new()),
            cold_storage: Arc::new(InMemoryColdStorageClient::new()),
            object_stores: ObjectStoreRegistry::new(),
            storage_locations: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: StorageLocation) -> Self {
        self.storage_locations.push(location);
        self
    }

    /// Store serving one bucket
    pub fn with_bucket_store(mut self, bucket: &str, store: Arc<InMemoryObjectStore>) -> Self {
        self.object_stores = self.object_stores.with_bucket_client(bucket, store);
        self
    }

    /// Store serving every AWS bucket without a dedicated store
    pub fn with_default_store(mut self, store: Arc<InMemoryObjectStore>) -> Self {
        self.object_stores = self.object_stores.with_provider("AWS", store);
        self
    }

    pub fn identity() -> ProcessIdentity {
        ProcessIdentity::new(HOST, PID)
    }

    pub fn context(&self) -> Arc<WorkerContext> {
        let restoration = RestorationContext {
            registry: self.registry.clone(),
            object_stores: Arc::new(self.object_stores.clone()),
            cold_storage: self.cold_storage.clone(),
            storage_locations: Arc::new(self.storage_locations.clone()),
            config: RestorationConfig::default(),
        };
        Arc::new(
            WorkerContext::new(self.broker.clone(), self.cache.clone(), restoration, Self::identity())
                .with_persistence(PersistenceConfig::immediate()),
        )
    }

    pub fn engine(
        &self,
        settings: WorkerSettings,
        capability: impl WorkerCapability,
    ) -> Arc<WorkerEngine> {
        Arc::new(
            WorkerEngine::new(settings, self.context(), Arc::new(capability))
                .with_poll_interval(Duration::from_millis(10))
                .with_shutdown_grace(Duration::from_secs(5)),
        )
    }
}

/// Runs `engine` until `done` holds for its stats, then shuts it down and
/// returns the final stats
pub async fn run_until(
    engine: &Arc<WorkerEngine>,
    done: impl Fn(&EngineStatsSnapshot) -> bool,
) -> EngineStatsSnapshot {
    let cancel = CancellationToken::new();
    let running = tokio::spawn(engine.clone().run(cancel.clone()));
    for _ in 0..500 {
        if done(&engine.stats()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
    running
        .await
        .expect("engine task panicked")
        .expect("engine failed to start")
}
