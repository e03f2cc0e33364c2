//! # Object Storage
//!
//! S3-compatible object operations behind a trait, plus routing from a
//! provider/bucket pair to the client that serves it. Clients are built once at
//! startup and shared read-only across workers.

pub mod in_memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;

pub use in_memory::InMemoryObjectStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Storage operation failed: {operation} {bucket}/{key}: {message}")]
    Operation {
        operation: String,
        bucket: String,
        key: String,
        message: String,
    },

    #[error("No storage client for provider {provider} and bucket {bucket}")]
    NoClient { provider: String, bucket: String },
}

impl StorageError {
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn operation(
        operation: impl Into<String>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Operation {
            operation: operation.into(),
            bucket: bucket.into(),
            key: key.into(),
            message: message.into(),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Streaming body of an object
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectReader>;

    /// Upload from a stream. `size` is `None` when the length is not known up
    /// front, as with an archive still being assembled.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectReader,
        size: Option<u64>,
    ) -> StorageResult<ObjectInfo>;

    async fn stat_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo>;

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;
}

/// Maps providers and specific buckets to clients
#[derive(Default, Clone)]
pub struct ObjectStoreRegistry {
    providers: HashMap<String, Arc<dyn ObjectStore>>,
    buckets: HashMap<String, Arc<dyn ObjectStore>>,
}

impl std::fmt::Debug for ObjectStoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("buckets", &self.buckets.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ObjectStoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: impl Into<String>, client: Arc<dyn ObjectStore>) -> Self {
        self.providers.insert(provider.into(), client);
        self
    }

    /// Client used for one exact bucket name, ahead of its provider's client
    pub fn with_bucket_client(mut self, bucket: impl Into<String>, client: Arc<dyn ObjectStore>) -> Self {
        self.buckets.insert(bucket.into(), client);
        self
    }

    pub fn client_for(&self, provider: &str, bucket: &str) -> StorageResult<Arc<dyn ObjectStore>> {
        self.buckets
            .get(bucket)
            .or_else(|| self.providers.get(provider))
            .cloned()
            .ok_or_else(|| StorageError::NoClient {
                provider: provider.to_string(),
                bucket: bucket.to_string(),
            })
    }
}
