use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{CacheError, CacheResult, ResultCache};
use crate::models::{RestorationObject, WorkResult};

/// Result cache held in process memory
#[derive(Debug, Default)]
pub struct InMemoryResultCache {
    work_results: DashMap<(i64, String), WorkResult>,
    restoration_objects: DashMap<i64, RestorationObject>,
    failing_saves: AtomicUsize,
}

impl InMemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` saves of either kind fail
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> CacheResult<()> {
        let failed = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(CacheError::BackendError("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ResultCache for InMemoryResultCache {
    async fn work_result_get(
        &self,
        work_item_id: i64,
        operation: &str,
    ) -> CacheResult<Option<WorkResult>> {
        Ok(self
            .work_results
            .get(&(work_item_id, operation.to_string()))
            .map(|r| r.clone()))
    }

    async fn work_result_save(&self, result: &WorkResult) -> CacheResult<()> {
        self.take_failure()?;
        self.work_results.insert(
            (result.work_item_id, result.operation.clone()),
            result.clone(),
        );
        Ok(())
    }

    async fn restoration_object_get(
        &self,
        work_item_id: i64,
    ) -> CacheResult<Option<RestorationObject>> {
        Ok(self.restoration_objects.get(&work_item_id).map(|o| o.clone()))
    }

    async fn restoration_object_save(
        &self,
        work_item_id: i64,
        object: &RestorationObject,
    ) -> CacheResult<()> {
        self.take_failure()?;
        self.restoration_objects.insert(work_item_id, object.clone());
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_work_results_keyed_by_operation() {
        let cache = InMemoryResultCache::new();
        let mut result = WorkResult::new(5, "restore_object");
        result.attempt = 2;
        cache.work_result_save(&result).await.unwrap();

        let found = cache.work_result_get(5, "restore_object").await.unwrap();
        assert_eq!(found.map(|r| r.attempt), Some(2));
        assert!(cache.work_result_get(5, "restore_file").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let cache = InMemoryResultCache::new();
        cache.fail_next_saves(1);
        let result = WorkResult::new(5, "op");
        assert!(cache.work_result_save(&result).await.is_err());
        assert!(cache.work_result_save(&result).await.is_ok());
    }
}
