//! In-memory object store

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use tokio::io::AsyncReadExt;

use super::{ObjectInfo, ObjectReader, ObjectStore, StorageError, StorageResult};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
    failing_keys: RwLock<HashSet<String>>,
    gets: RwLock<Vec<(String, String)>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        let data = data.into();
        let etag = hex::encode(Md5::digest(&data));
        self.objects.write().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                etag,
                last_modified: Utc::now(),
            },
        );
    }

    /// Body of a stored object (for testing)
    pub fn get_bytes(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    /// Every get so far, as `(bucket, key)` (for testing)
    pub fn get_calls(&self) -> Vec<(String, String)> {
        self.gets.read().clone()
    }

    /// Gets of `key` in any bucket will fail
    pub fn fail_gets_for(&self, key: &str) {
        self.failing_keys.write().insert(key.to_string());
    }

    fn info(bucket: &str, key: &str, object: &StoredObject) -> ObjectInfo {
        ObjectInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: object.data.len() as u64,
            etag: object.etag.clone(),
            last_modified: object.last_modified,
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectReader> {
        self.gets.write().push((bucket.to_string(), key.to_string()));
        if self.failing_keys.read().contains(key) {
            return Err(StorageError::operation("get", bucket, key, "injected failure"));
        }
        let data = self
            .get_bytes(bucket, key)
            .ok_or_else(|| StorageError::not_found(bucket, key))?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: ObjectReader,
        size: Option<u64>,
    ) -> StorageResult<ObjectInfo> {
        let mut data = Vec::new();
        body.read_to_end(&mut data)
            .await
            .map_err(|e| StorageError::operation("put", bucket, key, e.to_string()))?;
        if let Some(expected) = size {
            if expected != data.len() as u64 {
                return Err(StorageError::operation(
                    "put",
                    bucket,
                    key,
                    format!("expected {expected} bytes, got {}", data.len()),
                ));
            }
        }
        self.insert(bucket, key, data);
        self.stat_object(bucket, key).await
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo> {
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| Self::info(bucket, key, o))
            .ok_or_else(|| StorageError::not_found(bucket, key))
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        Ok(self
            .objects
            .read()
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((b, k), o)| Self::info(b, k, o))
            .collect())
    }
}
