//! # Registry Client Trait
//!
//! Interface to the metadata registry, the system of record for work items,
//! files, objects and institutions.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::{GenericFile, Institution, IntellectualObject, WorkItem};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{record_type} not found: {key}")]
    NotFound { record_type: String, key: String },

    #[error("Registry request failed: {operation}: {message}")]
    Request { operation: String, message: String },

    #[error("Invalid registry record: {message}")]
    InvalidRecord { message: String },
}

impl RegistryError {
    pub fn not_found(record_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            record_type: record_type.into(),
            key: key.into(),
        }
    }

    pub fn request(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Paging, sort and filter parameters for list calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    /// 1-based page number
    pub page: usize,
    pub per_page: usize,
    pub sort: Option<String>,
    pub filters: BTreeMap<String, String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 100,
            sort: None,
            filters: BTreeMap::new(),
        }
    }
}

impl ListParams {
    pub fn new(page: usize, per_page: usize) -> Self {
        Self {
            page,
            per_page,
            ..Default::default()
        }
    }

    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn filter(&self, key: &str) -> Option<&str> {
        self.filters.get(key).map(String::as_str)
    }

    /// Encoded as query pairs, in key order
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("per_page".to_string(), self.per_page.to_string()),
        ];
        if let Some(sort) = &self.sort {
            pairs.push(("sort".to_string(), sort.clone()));
        }
        pairs.extend(self.filters.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }
}

#[async_trait]
pub trait RegistryClient: Send + Sync + 'static {
    async fn work_item_get(&self, id: i64) -> RegistryResult<Option<WorkItem>>;

    /// Creates the item when its id is 0, otherwise updates it. Returns the
    /// stored record.
    async fn work_item_save(&self, item: &WorkItem) -> RegistryResult<WorkItem>;

    async fn work_item_list(&self, params: &ListParams) -> RegistryResult<Vec<WorkItem>>;

    async fn generic_file_get(&self, id: i64) -> RegistryResult<Option<GenericFile>>;

    async fn generic_file_get_by_identifier(
        &self,
        identifier: &str,
    ) -> RegistryResult<Option<GenericFile>>;

    /// Supports `intellectual_object_identifier` and `state` filters and
    /// `sort=name`
    async fn generic_file_list(&self, params: &ListParams) -> RegistryResult<Vec<GenericFile>>;

    async fn intellectual_object_get_by_identifier(
        &self,
        identifier: &str,
    ) -> RegistryResult<Option<IntellectualObject>>;

    async fn institution_get(&self, id: i64) -> RegistryResult<Option<Institution>>;
}
