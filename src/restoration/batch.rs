//! Paginated listing of an object's active files.

use std::sync::Arc;
use tracing::debug;

use crate::models::GenericFile;
use crate::registry::{ListParams, RegistryClient, RegistryResult};

/// Walks an object's files page by page, sorted by name. A page shorter than
/// the batch size is the last one.
pub struct FileBatches {
    registry: Arc<dyn RegistryClient>,
    object_identifier: String,
    batch_size: usize,
    page: usize,
    exhausted: bool,
}

impl FileBatches {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        object_identifier: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            registry,
            object_identifier: object_identifier.into(),
            batch_size: batch_size.max(1),
            page: 1,
            exhausted: false,
        }
    }

    /// Next page of files, or `None` once the listing is exhausted
    pub async fn next_batch(&mut self) -> RegistryResult<Option<Vec<GenericFile>>> {
        if self.exhausted {
            return Ok(None);
        }
        let params = ListParams::new(self.page, self.batch_size)
            .with_sort("name")
            .with_filter("intellectual_object_identifier", &self.object_identifier)
            .with_filter("state", "A");
        let files = self.registry.generic_file_list(&params).await?;
        debug!(
            object_identifier = %self.object_identifier,
            page = self.page,
            count = files.len(),
            "Fetched batch of files"
        );

        self.page += 1;
        if files.len() < self.batch_size {
            self.exhausted = true;
        }
        if files.is_empty() {
            return Ok(None);
        }
        Ok(Some(files))
    }

    /// Pages requested so far
    pub fn pages_fetched(&self) -> usize {
        self.page - 1
    }
}
