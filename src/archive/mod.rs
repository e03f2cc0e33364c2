//! # Streaming Archive
//!
//! Tar assembly over an in-process pipe so an upload can consume the archive
//! while it is still being written, plus in-transit digest computation.

pub mod digest;
pub mod tar_pipe_writer;

use thiserror::Error;

pub use digest::{DigestAlgorithm, DigestHandle, DigestReader, MultiDigest};
pub use tar_pipe_writer::{ArchiveEntry, TarPipeWriter};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Invalid archive header for {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Size mismatch for {name}: header says {expected} bytes, reader yielded {actual}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("Archive pipe error while writing {name}: {source}")]
    Pipe {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error reading source for {name}: {source}")]
    Source {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

impl ArchiveError {
    pub fn invalid_header(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn pipe(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Pipe {
            name: name.into(),
            source,
        }
    }

    pub fn source(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Source {
            name: name.into(),
            source,
        }
    }
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
