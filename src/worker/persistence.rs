//! # Bookkeeping Persistence
//!
//! Saves of work items and work results made while routing tasks. Each save
//! is retried a bounded number of times; when retries run out the failure is
//! logged at `error` and counted, and the task carries on. Bookkeeping never
//! aborts an attempt.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{error, warn};

use super::context::WorkerContext;
use crate::models::{RestorationObject, WorkItem, WorkResult};
use crate::registry::RegistryResult;

/// Runs `operation` up to `attempts` times, sleeping `backoff` between tries
pub async fn retry_with_backoff<F, T, E, Fut>(
    operation_name: &str,
    attempts: u32,
    backoff: Duration,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_attempts = attempts,
                    error = %e,
                    "Retrying after failure"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

impl WorkerContext {
    fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Bookkeeping saves that ran out of retries
    pub fn persistence_failures(&self) -> u64 {
        self.persistence_failures.load(Ordering::Relaxed)
    }

    /// Saves `item` and adopts the registry's copy. Transient items are
    /// never saved. Returns whether the save landed.
    pub async fn save_work_item(&self, item: &mut WorkItem) -> bool {
        if item.is_transient() {
            return true;
        }
        match self.create_or_update_work_item(item).await {
            Ok(saved) => {
                *item = saved;
                true
            }
            Err(e) => {
                self.record_persistence_failure();
                error!(work_item_id = item.id, error = %e, "❌ Could not save work item");
                false
            }
        }
    }

    /// Registry save with retries, error returned to the caller
    pub async fn create_or_update_work_item(&self, item: &WorkItem) -> RegistryResult<WorkItem> {
        let registry = self.registry().clone();
        retry_with_backoff(
            "work_item_save",
            self.persistence.registry_attempts,
            self.persistence.registry_backoff(),
            || registry.work_item_save(item),
        )
        .await
    }

    pub async fn save_work_result(&self, result: &WorkResult) -> bool {
        if result.work_item_id < 0 {
            return true;
        }
        let saved = retry_with_backoff(
            "work_result_save",
            self.persistence.result_cache_attempts,
            self.persistence.result_cache_backoff(),
            || self.cache.work_result_save(result),
        )
        .await;
        if let Err(e) = saved {
            self.record_persistence_failure();
            error!(
                work_item_id = result.work_item_id,
                operation = %result.operation,
                error = %e,
                "❌ Could not save work result"
            );
            return false;
        }
        true
    }

    pub async fn save_restoration_object(&self, work_item_id: i64, object: &RestorationObject) -> bool {
        let saved = retry_with_backoff(
            "restoration_object_save",
            self.persistence.result_cache_attempts,
            self.persistence.result_cache_backoff(),
            || self.cache.restoration_object_save(work_item_id, object),
        )
        .await;
        if let Err(e) = saved {
            self.record_persistence_failure();
            error!(work_item_id = work_item_id, error = %e, "❌ Could not save restoration object");
            return false;
        }
        true
    }
}
