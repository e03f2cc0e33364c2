//! # Restoration
//!
//! Copies preserved content back to a depositor. Three jobs share the
//! machinery in this module:
//!
//! - [`BagRestorer`] streams every active file of an object into a tar archive
//!   that is uploaded to the depositor's restore bucket while it is assembled.
//! - [`FileRestorer`] copies one file, verifying its digest in transit.
//! - [`GlacierRestorer`] asks the cold-storage provider to thaw an object's
//!   files and reports whether they are all readable in the hot tier yet.
//!
//! All of them choose which stored copy to read with
//! [`best_restoration_source`] and list an object's files with [`FileBatches`].

pub mod bag_restorer;
pub mod batch;
pub mod file_restorer;
pub mod glacier_restorer;
pub mod source;

use std::sync::Arc;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::cold_storage::{ColdStorageClient, ColdStorageError};
use crate::config::RestorationConfig;
use crate::models::{ProcessingError, StorageLocation};
use crate::registry::{RegistryClient, RegistryError};
use crate::storage::{ObjectStoreRegistry, StorageError};

pub use bag_restorer::BagRestorer;
pub use batch::FileBatches;
pub use file_restorer::FileRestorer;
pub use glacier_restorer::GlacierRestorer;
pub use source::{best_restoration_source, RestorationSourceMatch};

#[derive(Error, Debug)]
pub enum RestorationError {
    #[error("Could not find any suitable restoration source for {identifier} ({urls} storage URLs, {locations} storage locations)")]
    NoSource {
        identifier: String,
        urls: usize,
        locations: usize,
    },

    #[error("{record_type} not found: {key}")]
    MissingRecord { record_type: String, key: String },

    #[error("{algorithm} digest mismatch for {identifier}. Registry says {expected}, stored copy has {actual}")]
    DigestMismatch {
        identifier: String,
        algorithm: String,
        expected: String,
        actual: String,
    },

    #[error("Not able to verify any checksums for {identifier}")]
    Unverified { identifier: String },

    #[error("Invalid identifier {identifier}: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    #[error("Upload of {key} did not complete: {message}")]
    Upload { key: String, message: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    ColdStorage(#[from] ColdStorageError),
}

impl RestorationError {
    pub fn missing_record(record_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingRecord {
            record_type: record_type.into(),
            key: key.into(),
        }
    }

    pub fn invalid_identifier(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the job could change the outcome
    pub fn is_fatal(&self) -> bool {
        match self {
            RestorationError::Registry(RegistryError::Request { .. }) => false,
            RestorationError::Storage(StorageError::Operation { .. }) => false,
            RestorationError::ColdStorage(ColdStorageError::Transport { .. }) => false,
            RestorationError::Upload { .. } => false,
            _ => true,
        }
    }
}

pub type RestorationResult<T> = Result<T, RestorationError>;

/// A restoration error tied to the object or file it concerns
#[derive(Debug)]
pub struct AttributedError {
    pub identifier: String,
    pub error: RestorationError,
    pub is_fatal: bool,
}

impl AttributedError {
    /// Fatality follows [`RestorationError::is_fatal`]
    pub fn new(identifier: impl Into<String>, error: impl Into<RestorationError>) -> Self {
        let error = error.into();
        Self {
            identifier: identifier.into(),
            is_fatal: error.is_fatal(),
            error,
        }
    }

    pub fn fatal(identifier: impl Into<String>, error: impl Into<RestorationError>) -> Self {
        Self {
            identifier: identifier.into(),
            error: error.into(),
            is_fatal: true,
        }
    }

    #[track_caller]
    pub fn into_processing_error(self, work_item_id: i64) -> ProcessingError {
        ProcessingError::new(work_item_id, self.identifier, self.error.to_string(), self.is_fatal)
    }
}

/// Collaborators shared by every restoration job in a worker process
#[derive(Clone)]
pub struct RestorationContext {
    pub registry: Arc<dyn RegistryClient>,
    pub object_stores: Arc<ObjectStoreRegistry>,
    pub cold_storage: Arc<dyn ColdStorageClient>,
    pub storage_locations: Arc<Vec<StorageLocation>>,
    pub config: RestorationConfig,
}

impl std::fmt::Debug for RestorationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestorationContext")
            .field("object_stores", &self.object_stores)
            .field("cold_storage", &self.cold_storage.provider_name())
            .field("storage_locations", &self.storage_locations.len())
            .field("config", &self.config)
            .finish()
    }
}
