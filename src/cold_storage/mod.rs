//! # Cold Storage
//!
//! Asynchronous "thaw" protocol against a cold-storage provider. A restore
//! request moves an object from the cold tier back into its hot bucket; the
//! provider answers with a status code that maps onto [`FileRestoreState`].

pub mod client;
pub mod signer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::{restore_request_body, ColdStorageClient, HttpColdStorageClient, InMemoryColdStorageClient};
pub use signer::Credentials;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColdStorageError {
    #[error("Restore request for {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Request signing failed: {message}")]
    Signing { message: String },

    #[error("Missing credentials for provider {provider}")]
    MissingCredentials { provider: String },
}

impl ColdStorageError {
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }
}

pub type ColdStorageResult<T> = Result<T, ColdStorageError>;

/// Why a restore request ended in error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestoreFailure {
    /// 404: nothing to restore
    NotFound,
    /// Any status the protocol does not define
    UnexpectedStatus(u16),
}

/// Per-file position in the restore protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileRestoreState {
    NotRequested,
    Pending,
    Completed,
    Error(RestoreFailure),
}

impl FileRestoreState {
    /// Outcome of a restore request, decided by status code alone
    pub fn from_status(status: u16) -> Self {
        match status {
            200 => FileRestoreState::Completed,
            202 | 409 | 503 => FileRestoreState::Pending,
            404 => FileRestoreState::Error(RestoreFailure::NotFound),
            other => FileRestoreState::Error(RestoreFailure::UnexpectedStatus(other)),
        }
    }

    /// Every error state is permanent
    pub fn is_fatal(&self) -> bool {
        matches!(self, FileRestoreState::Error(_))
    }

    pub fn describe(&self) -> String {
        match self {
            FileRestoreState::NotRequested => "restore not requested".to_string(),
            FileRestoreState::Pending => "restore pending".to_string(),
            FileRestoreState::Completed => "restored to hot tier".to_string(),
            FileRestoreState::Error(RestoreFailure::NotFound) => {
                "object not found in cold storage (404)".to_string()
            }
            FileRestoreState::Error(RestoreFailure::UnexpectedStatus(status)) => {
                format!("unexpected restore response status {status}")
            }
        }
    }
}

/// Tally of per-file states for one object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreTally {
    pub completed: usize,
    pub pending: usize,
    pub errored: usize,
}

impl RestoreTally {
    pub fn record(&mut self, state: FileRestoreState) {
        match state {
            FileRestoreState::Completed => self.completed += 1,
            FileRestoreState::Pending | FileRestoreState::NotRequested => self.pending += 1,
            FileRestoreState::Error(_) => self.errored += 1,
        }
    }

    /// A request that never got a provider answer, e.g. no source or a
    /// network failure
    pub fn record_failed_request(&mut self) {
        self.errored += 1;
    }

    pub fn fully_restored(&self) -> bool {
        self.completed > 0 && self.pending == 0 && self.errored == 0
    }

    pub fn total(&self) -> usize {
        self.completed + self.pending + self.errored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_table() {
        assert_eq!(FileRestoreState::from_status(200), FileRestoreState::Completed);
        for status in [202, 409, 503] {
            assert_eq!(FileRestoreState::from_status(status), FileRestoreState::Pending);
        }
        assert_eq!(
            FileRestoreState::from_status(404),
            FileRestoreState::Error(RestoreFailure::NotFound)
        );
        assert_eq!(
            FileRestoreState::from_status(403),
            FileRestoreState::Error(RestoreFailure::UnexpectedStatus(403))
        );
        assert!(FileRestoreState::from_status(404).is_fatal());
        assert!(!FileRestoreState::Pending.is_fatal());
    }

    #[test]
    fn test_tally() {
        let mut tally = RestoreTally::default();
        assert!(!tally.fully_restored());
        tally.record(FileRestoreState::Completed);
        assert!(tally.fully_restored());
        tally.record(FileRestoreState::Pending);
        assert!(!tally.fully_restored());

        let mut tally = RestoreTally::default();
        tally.record(FileRestoreState::Completed);
        tally.record(FileRestoreState::from_status(404));
        assert!(!tally.fully_restored());
    }

    proptest! {
        #[test]
        fn status_mapping_is_total(status in 100u16..600) {
            let state = FileRestoreState::from_status(status);
            let expected = match status {
                200 => FileRestoreState::Completed,
                202 | 409 | 503 => FileRestoreState::Pending,
                404 => FileRestoreState::Error(RestoreFailure::NotFound),
                other => FileRestoreState::Error(RestoreFailure::UnexpectedStatus(other)),
            };
            prop_assert_eq!(state, expected);
            prop_assert_ne!(state, FileRestoreState::NotRequested);
        }
    }
}
