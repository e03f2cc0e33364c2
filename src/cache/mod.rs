//! # Result Cache
//!
//! Short-lived store for work results and restoration objects, keyed by work
//! item. Redis in production, in-memory for tests.

pub mod in_memory;
pub mod redis;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{RestorationObject, WorkResult};

pub use in_memory::InMemoryResultCache;
pub use redis::RedisResultCache;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    #[error("Cache backend error: {0}")]
    BackendError(String),

    #[error("Cache serialization error: {0}")]
    SerializationError(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::SerializationError(err.to_string())
    }
}

#[async_trait]
pub trait ResultCache: Send + Sync + 'static {
    /// Result for one work item at one operation (stage topic)
    async fn work_result_get(&self, work_item_id: i64, operation: &str)
        -> CacheResult<Option<WorkResult>>;

    async fn work_result_save(&self, result: &WorkResult) -> CacheResult<()>;

    async fn restoration_object_get(&self, work_item_id: i64)
        -> CacheResult<Option<RestorationObject>>;

    async fn restoration_object_save(
        &self,
        work_item_id: i64,
        object: &RestorationObject,
    ) -> CacheResult<()>;

    fn provider_name(&self) -> &'static str;
}

/// Hash field under which a work result is stored
pub fn work_result_field(operation: &str) -> String {
    format!("workresult:{operation}")
}

pub const RESTORATION_FIELD: &str = "restoration";
