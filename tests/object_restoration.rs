//! End-to-end hot-tier restoration through the worker engine

mod common;

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use common::*;
use preservation_core::cache::ResultCache;
use preservation_core::constants::{topics, Action, Stage, Status};
use preservation_core::messaging::MessagingService;
use preservation_core::storage::InMemoryObjectStore;
use preservation_core::worker::{RestorationWorker, WorkerSettings};

const OBJECT: &str = "test.edu/photos";
const VIRGINIA: &str = "preservation.va";
const OREGON: &str = "preservation.or";

/// Tar entry name to contents
fn tar_entries(bytes: &[u8]) -> HashMap<String, String> {
    let mut archive = tar::Archive::new(bytes);
    let mut entries = HashMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().to_string();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        entries.insert(name, contents);
    }
    entries
}

#[tokio::test]
async fn test_object_restores_from_most_accessible_copy() {
    let virginia = location(VIRGINIA, "us-east-1", 10, "STANDARD");
    let oregon = location(OREGON, "us-west-2", 3, "STANDARD");

    // Only the Oregon copies are readable, so reading Virginia would fail
    let virginia_store = Arc::new(InMemoryObjectStore::new());
    let oregon_store = Arc::new(InMemoryObjectStore::new());
    let restore_store = Arc::new(InMemoryObjectStore::new());
    oregon_store.insert(OREGON, "uuid-a", "first file\n");
    oregon_store.insert(OREGON, "uuid-b", "second file\n");

    let env = TestEnvironment::new()
        .with_location(virginia.clone())
        .with_location(oregon.clone())
        .with_bucket_store(VIRGINIA, virginia_store.clone())
        .with_bucket_store(OREGON, oregon_store.clone())
        .with_default_store(restore_store.clone());

    insert_object(&env.registry, OBJECT, "Standard");
    for (id, name, key, content) in [
        (1, "data/a.txt", "uuid-a", "first file\n"),
        (2, "data/sub/b.txt", "uuid-b", "second file\n"),
    ] {
        env.registry.insert_generic_file(
            GenericFileBuilder::new(id, &format!("{OBJECT}/{name}"))
                .with_content(content.as_bytes())
                .stored_at(&virginia, key)
                .stored_at(&oregon, key)
                .build(),
        );
    }
    let item = env
        .registry
        .insert_work_item(restore_request(Action::RestoreObject, OBJECT));
    env.broker
        .send_message(topics::RESTORE_OBJECT, &item.id.to_string())
        .await
        .unwrap();

    let engine = env.engine(WorkerSettings::restore_object(), RestorationWorker::Object);
    let stats = run_until(&engine, |s| s.succeeded + s.failed + s.requeued > 0).await;
    assert_eq!(stats.succeeded, 1, "stats: {stats:?}");

    assert!(virginia_store.get_calls().is_empty());
    assert_eq!(oregon_store.get_calls().len(), 2);

    let tarball = restore_store
        .get_bytes(RESTORE_BUCKET, "test.edu/photos.tar")
        .expect("bag uploaded to restore bucket");
    let entries = tar_entries(&tarball);
    assert_eq!(entries["photos/data/a.txt"], "first file\n");
    assert_eq!(entries["photos/data/sub/b.txt"], "second file\n");
    assert!(entries.keys().any(|name| name.trim_end_matches('/') == "photos/data/sub"));
    assert!(entries.contains_key("photos/bagit.txt"));
    assert!(entries["photos/manifest-sha256.txt"].contains("  data/sub/b.txt\n"));
    assert!(entries["photos/manifest-md5.txt"].contains("  data/a.txt\n"));

    let url = format!("https://s3.amazonaws.com/{RESTORE_BUCKET}/test.edu/photos.tar");
    let saved = env.registry.work_item(item.id).unwrap();
    assert_eq!(saved.stage, Stage::Resolve);
    assert_eq!(saved.status, Status::Success);
    assert!(!saved.retry);
    assert!(!saved.needs_admin_review);
    assert!(!saved.has_lease());
    assert_eq!(saved.note, format!("Object {OBJECT} restored to {url}."));

    let job = env.cache.restoration_object_get(item.id).await.unwrap().unwrap();
    assert!(job.all_files_restored);
    assert_eq!(job.url, url);

    let result = env
        .cache
        .work_result_get(item.id, topics::RESTORE_OBJECT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.attempt, 1);
    assert!(result.finished_at.is_some());
    assert!(result.errors.is_empty());

    assert_eq!(env.broker.queue_length(topics::RESTORE_OBJECT).await, 0);
    assert!(engine.dedup_ring().is_empty());
}

#[tokio::test]
async fn test_digest_mismatch_is_fatal() {
    let standard = location(VIRGINIA, "us-east-1", 1, "STANDARD");
    let store = Arc::new(InMemoryObjectStore::new());
    store.insert(VIRGINIA, "uuid-a", "0riginal\n");
    let env = TestEnvironment::new()
        .with_location(standard.clone())
        .with_default_store(store);

    insert_object(&env.registry, OBJECT, "Standard");
    env.registry.insert_generic_file(
        GenericFileBuilder::new(1, &format!("{OBJECT}/data/a.txt"))
            .with_content(b"original\n")
            .stored_at(&standard, "uuid-a")
            .build(),
    );
    let item = env
        .registry
        .insert_work_item(restore_request(Action::RestoreObject, OBJECT));
    env.broker
        .send_message(topics::RESTORE_OBJECT, &item.id.to_string())
        .await
        .unwrap();

    let engine = env.engine(WorkerSettings::restore_object(), RestorationWorker::Object);
    let stats = run_until(&engine, |s| s.succeeded + s.failed + s.requeued > 0).await;
    assert_eq!(stats.failed, 1, "stats: {stats:?}");

    let saved = env.registry.work_item(item.id).unwrap();
    assert_eq!(saved.stage, Stage::Requested);
    assert!(!saved.retry);
    assert!(saved.needs_admin_review);
    assert!(saved.note.contains("digest mismatch"), "note: {}", saved.note);
    assert_eq!(env.broker.queue_length(topics::RESTORE_OBJECT).await, 0);
}
