//! End-to-end cold-storage restoration through the worker engine

mod common;

use common::*;
use preservation_core::cache::ResultCache;
use preservation_core::constants::{topics, Action, Stage, Status};
use preservation_core::messaging::MessagingService;
use preservation_core::models::StorageLocation;
use preservation_core::worker::{RestorationWorker, WorkerSettings};

const OBJECT: &str = "test.edu/letters";

fn glacier() -> StorageLocation {
    location("preservation.glacier.oh", "us-east-2", 40, "GLACIER")
}

/// Object with `count` files kept only in cold storage, plus a queued
/// restore request for it
async fn setup(count: i64) -> (TestEnvironment, i64) {
    let env = TestEnvironment::new().with_location(glacier());
    insert_object(&env.registry, OBJECT, "Glacier-OH");
    for i in 1..=count {
        env.registry.insert_generic_file(
            GenericFileBuilder::new(i, &format!("{OBJECT}/data/letter-{i}.txt"))
                .with_storage_option("Glacier-OH")
                .stored_at(&glacier(), &format!("uuid-{i}"))
                .build(),
        );
    }
    let item = env
        .registry
        .insert_work_item(restore_request(Action::GlacierRestore, OBJECT));
    env.broker
        .send_message(topics::RESTORE_GLACIER, &item.id.to_string())
        .await
        .unwrap();
    (env, item.id)
}

#[tokio::test]
async fn test_one_missing_file_fails_the_object() {
    let (env, id) = setup(3).await;
    env.cold_storage.set_status(glacier().url_for("uuid-2"), 404);

    let engine = env.engine(WorkerSettings::restore_glacier(), RestorationWorker::ColdStorage);
    let stats = run_until(&engine, |s| s.succeeded + s.failed + s.requeued > 0).await;
    assert_eq!(stats.failed, 1, "stats: {stats:?}");
    assert_eq!(stats.succeeded, 0);
    assert_eq!(env.cold_storage.requests().len(), 3);

    let saved = env.registry.work_item(id).unwrap();
    assert!(!saved.retry);
    assert!(saved.needs_admin_review);
    assert!(saved.note.contains("letter-2.txt"), "note: {}", saved.note);
    assert!(saved.note.contains("404"), "note: {}", saved.note);

    let job = env.cache.restoration_object_get(id).await.unwrap().unwrap();
    assert!(!job.all_files_restored);

    // No hot-tier follow-on
    assert_eq!(env.registry.work_items().len(), 1);
    assert_eq!(env.broker.queue_length(topics::RESTORE_OBJECT).await, 0);
    assert_eq!(env.broker.queue_length(topics::RESTORE_GLACIER).await, 0);
}

#[tokio::test]
async fn test_pending_thaw_is_requeued() {
    let (env, id) = setup(2).await;
    env.cold_storage.set_status(glacier().url_for("uuid-1"), 202);

    let engine = env.engine(WorkerSettings::restore_glacier(), RestorationWorker::ColdStorage);
    let stats = run_until(&engine, |s| s.succeeded + s.failed + s.requeued > 0).await;
    assert_eq!(stats.requeued, 1, "stats: {stats:?}");

    let saved = env.registry.work_item(id).unwrap();
    assert!(saved.retry);
    assert!(!saved.needs_admin_review);
    assert!(!saved.has_lease());
    assert_eq!(saved.status, Status::Started);
    // Still waiting on the broker for the next attempt
    assert_eq!(env.broker.queue_length(topics::RESTORE_GLACIER).await, 1);
}

#[tokio::test]
async fn test_completed_thaw_queues_hot_tier_restore() {
    let (env, id) = setup(3).await;

    let engine = env.engine(WorkerSettings::restore_glacier(), RestorationWorker::ColdStorage);
    let stats = run_until(&engine, |s| s.succeeded + s.failed + s.requeued > 0).await;
    assert_eq!(stats.succeeded, 1, "stats: {stats:?}");

    let saved = env.registry.work_item(id).unwrap();
    assert_eq!(saved.status, Status::Success);
    assert_eq!(saved.stage, Stage::Requested);
    assert_eq!(saved.note, format!("Object {OBJECT} restored from Glacier to S3."));

    let follow_on = env
        .registry
        .work_items()
        .into_iter()
        .find(|item| item.id != id)
        .expect("hot-tier restore item created");
    assert_eq!(follow_on.action, Action::RestoreObject);
    assert_eq!(follow_on.object_identifier, OBJECT);
    assert_eq!(follow_on.status, Status::Pending);
    assert_eq!(
        env.broker.bodies(topics::RESTORE_OBJECT).await,
        vec![follow_on.id.to_string()]
    );
}
