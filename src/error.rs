//! # Crate Error Type
//!
//! Umbrella error that subsystem errors convert into at the crate boundary.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::cache::CacheError;
use crate::cold_storage::ColdStorageError;
use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::registry::RegistryError;
use crate::restoration::RestorationError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum PreservationError {
    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    ColdStorage(#[from] ColdStorageError),

    #[error(transparent)]
    Restoration(#[from] RestorationError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Worker error: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, PreservationError>;
