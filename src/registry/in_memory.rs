//! # In-Memory Registry
//!
//! Registry backed by concurrent maps. Supports failure injection on work item
//! saves so bookkeeping paths can be exercised.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use super::client::{ListParams, RegistryClient, RegistryError, RegistryResult};
use crate::models::{GenericFile, Institution, IntellectualObject, WorkItem};

#[derive(Debug)]
pub struct InMemoryRegistry {
    work_items: DashMap<i64, WorkItem>,
    generic_files: DashMap<i64, GenericFile>,
    objects: DashMap<String, IntellectualObject>,
    institutions: DashMap<i64, Institution>,
    next_work_item_id: AtomicI64,
    failing_saves: AtomicUsize,
    save_calls: AtomicUsize,
    file_list_calls: AtomicUsize,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            work_items: DashMap::new(),
            generic_files: DashMap::new(),
            objects: DashMap::new(),
            institutions: DashMap::new(),
            next_work_item_id: AtomicI64::new(1000),
            failing_saves: AtomicUsize::new(0),
            save_calls: AtomicUsize::new(0),
            file_list_calls: AtomicUsize::new(0),
        }
    }

    /// Store an item as-is. Items with id 0 get a fresh id.
    pub fn insert_work_item(&self, mut item: WorkItem) -> WorkItem {
        if item.id == 0 {
            item.id = self.next_work_item_id.fetch_add(1, Ordering::SeqCst);
        }
        self.work_items.insert(item.id, item.clone());
        item
    }

    pub fn insert_generic_file(&self, file: GenericFile) {
        self.generic_files.insert(file.id, file);
    }

    pub fn insert_object(&self, object: IntellectualObject) {
        self.objects.insert(object.identifier.clone(), object);
    }

    pub fn insert_institution(&self, institution: Institution) {
        self.institutions.insert(institution.id, institution);
    }

    /// Snapshot of a stored item (for testing)
    pub fn work_item(&self, id: i64) -> Option<WorkItem> {
        self.work_items.get(&id).map(|item| item.clone())
    }

    pub fn work_items(&self) -> Vec<WorkItem> {
        let mut items: Vec<WorkItem> = self.work_items.iter().map(|e| e.value().clone()).collect();
        items.sort_by_key(|item| item.id);
        items
    }

    /// Make the next `count` work item saves fail
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn file_list_calls(&self) -> usize {
        self.file_list_calls.load(Ordering::SeqCst)
    }
}

fn paginate<T>(items: Vec<T>, params: &ListParams) -> Vec<T> {
    let start = params.page.saturating_sub(1) * params.per_page;
    items.into_iter().skip(start).take(params.per_page).collect()
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn work_item_get(&self, id: i64) -> RegistryResult<Option<WorkItem>> {
        Ok(self.work_item(id))
    }

    async fn work_item_save(&self, item: &WorkItem) -> RegistryResult<WorkItem> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(RegistryError::request("work_item_save", "injected failure"));
        }
        if item.id < 0 {
            return Err(RegistryError::invalid_record("transient work items cannot be saved"));
        }
        if item.id > 0 && !self.work_items.contains_key(&item.id) {
            return Err(RegistryError::not_found("WorkItem", item.id.to_string()));
        }
        Ok(self.insert_work_item(item.clone()))
    }

    async fn work_item_list(&self, params: &ListParams) -> RegistryResult<Vec<WorkItem>> {
        let items = self
            .work_items()
            .into_iter()
            .filter(|item| {
                params
                    .filter("object_identifier")
                    .map_or(true, |v| item.object_identifier == v)
                    && params.filter("action").map_or(true, |v| item.action.as_str() == v)
            })
            .collect();
        Ok(paginate(items, params))
    }

    async fn generic_file_get(&self, id: i64) -> RegistryResult<Option<GenericFile>> {
        Ok(self.generic_files.get(&id).map(|f| f.clone()))
    }

    async fn generic_file_get_by_identifier(
        &self,
        identifier: &str,
    ) -> RegistryResult<Option<GenericFile>> {
        Ok(self
            .generic_files
            .iter()
            .find(|f| f.identifier == identifier)
            .map(|f| f.value().clone()))
    }

    async fn generic_file_list(&self, params: &ListParams) -> RegistryResult<Vec<GenericFile>> {
        self.file_list_calls.fetch_add(1, Ordering::SeqCst);
        let prefix = params
            .filter("intellectual_object_identifier")
            .map(|ident| format!("{ident}/"));
        let mut files: Vec<GenericFile> = self
            .generic_files
            .iter()
            .map(|f| f.value().clone())
            .filter(|f| prefix.as_ref().map_or(true, |p| f.identifier.starts_with(p)))
            .filter(|f| params.filter("state").map_or(true, |s| f.state == s))
            .collect();
        match params.sort.as_deref() {
            Some("name") => files.sort_by(|a, b| a.identifier.cmp(&b.identifier)),
            _ => files.sort_by_key(|f| f.id),
        }
        Ok(paginate(files, params))
    }

    async fn intellectual_object_get_by_identifier(
        &self,
        identifier: &str,
    ) -> RegistryResult<Option<IntellectualObject>> {
        Ok(self.objects.get(identifier).map(|o| o.clone()))
    }

    async fn institution_get(&self, id: i64) -> RegistryResult<Option<Institution>> {
        Ok(self.institutions.get(&id).map(|i| i.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{Action, Stage};

    fn file(id: i64, identifier: &str) -> GenericFile {
        GenericFile {
            id,
            identifier: identifier.to_string(),
            institution_id: 1,
            intellectual_object_id: 1,
            size: 1,
            state: "A".to_string(),
            storage_option: "Standard".to_string(),
            checksums: Vec::new(),
            storage_records: Vec::new(),
            file_modified: None,
        }
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_updates() {
        let registry = InMemoryRegistry::new();
        let saved = registry
            .work_item_save(&WorkItem::new(Action::RestoreObject, Stage::Requested))
            .await
            .unwrap();
        assert!(saved.id > 0);

        let mut changed = saved.clone();
        changed.note = "updated".to_string();
        registry.work_item_save(&changed).await.unwrap();
        assert_eq!(registry.work_item(saved.id).unwrap().note, "updated");
    }

    #[tokio::test]
    async fn test_injected_save_failures() {
        let registry = InMemoryRegistry::new();
        let item = registry.insert_work_item(WorkItem::new(Action::RestoreObject, Stage::Requested));
        registry.fail_next_saves(2);
        assert!(registry.work_item_save(&item).await.is_err());
        assert!(registry.work_item_save(&item).await.is_err());
        assert!(registry.work_item_save(&item).await.is_ok());
        assert_eq!(registry.save_calls(), 3);
    }

    #[tokio::test]
    async fn test_transient_items_are_rejected() {
        let registry = InMemoryRegistry::new();
        let item = WorkItem::transient_for_file(1, "test.edu/bag/data/a.txt");
        assert!(matches!(
            registry.work_item_save(&item).await,
            Err(RegistryError::InvalidRecord { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_list_filters_and_pages() {
        let registry = InMemoryRegistry::new();
        registry.insert_generic_file(file(1, "test.edu/bag/data/b.txt"));
        registry.insert_generic_file(file(2, "test.edu/bag/data/a.txt"));
        registry.insert_generic_file(file(3, "test.edu/other/data/a.txt"));

        let params = ListParams::new(1, 1)
            .with_sort("name")
            .with_filter("intellectual_object_identifier", "test.edu/bag");
        let page = registry.generic_file_list(&params).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, 2);

        let params = ListParams { page: 3, ..params };
        assert!(registry.generic_file_list(&params).await.unwrap().is_empty());
    }
}
