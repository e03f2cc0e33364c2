//! Fixity checks run through the engine without touching the registry's
//! work items

mod common;

use std::sync::Arc;

use common::*;
use preservation_core::constants::topics;
use preservation_core::messaging::MessagingService;
use preservation_core::storage::InMemoryObjectStore;
use preservation_core::worker::{FixityWorker, WorkerSettings};

const FILE: &str = "test.edu/maps/data/county.tif";

async fn setup(stored: &str) -> TestEnvironment {
    let standard = location("preservation.va", "us-east-1", 1, "STANDARD");
    let store = Arc::new(InMemoryObjectStore::new());
    store.insert("preservation.va", "uuid-map", stored.to_string());
    let env = TestEnvironment::new()
        .with_location(standard.clone())
        .with_default_store(store);
    env.registry.insert_generic_file(
        GenericFileBuilder::new(12, FILE)
            .with_content(b"tiff bytes")
            .stored_at(&standard, "uuid-map")
            .build(),
    );
    env.broker.send_message(topics::FIXITY_CHECK, FILE).await.unwrap();
    env
}

#[tokio::test]
async fn test_matching_file_passes() {
    let env = setup("tiff bytes").await;
    let engine = env.engine(WorkerSettings::fixity_check(), FixityWorker);
    let stats = run_until(&engine, |s| s.succeeded + s.failed + s.requeued > 0).await;

    assert_eq!(stats.succeeded, 1, "stats: {stats:?}");
    assert_eq!(stats.persistence_failures, 0);
    assert_eq!(env.registry.save_calls(), 0);
    assert!(env.registry.work_items().is_empty());
    assert_eq!(env.broker.queue_length(topics::FIXITY_CHECK).await, 0);
}

#[tokio::test]
async fn test_changed_file_fails() {
    let env = setup("tiff bytez").await;
    let engine = env.engine(WorkerSettings::fixity_check(), FixityWorker);
    let stats = run_until(&engine, |s| s.succeeded + s.failed + s.requeued > 0).await;

    assert_eq!(stats.failed, 1, "stats: {stats:?}");
    assert_eq!(env.registry.save_calls(), 0);
    assert_eq!(env.broker.queue_length(topics::FIXITY_CHECK).await, 0);
}
