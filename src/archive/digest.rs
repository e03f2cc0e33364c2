//! Multi-algorithm digests computed in the same pass as a copy.

use md5::Md5;
use parking_lot::Mutex;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

use super::{ArchiveError, ArchiveResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn parse(name: &str) -> ArchiveResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha1" => Ok(DigestAlgorithm::Sha1),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(ArchiveError::UnsupportedAlgorithm(name.to_string())),
        }
    }

    pub fn parse_all<S: AsRef<str>>(names: &[S]) -> ArchiveResult<Vec<Self>> {
        names.iter().map(|n| Self::parse(n.as_ref())).collect()
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Hasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            DigestAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            DigestAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Md5(h) => hex::encode(h.finalize()),
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Running digests for a set of algorithms
pub struct MultiDigest {
    hashers: Vec<(DigestAlgorithm, Hasher)>,
}

impl fmt::Debug for MultiDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiDigest")
            .field(
                "algorithms",
                &self.hashers.iter().map(|(a, _)| a.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl MultiDigest {
    pub fn new(algorithms: &[DigestAlgorithm]) -> Self {
        let mut hashers: Vec<(DigestAlgorithm, Hasher)> = Vec::with_capacity(algorithms.len());
        for &algorithm in algorithms {
            if !hashers.iter().any(|(a, _)| *a == algorithm) {
                hashers.push((algorithm, Hasher::new(algorithm)));
            }
        }
        Self { hashers }
    }

    pub fn is_empty(&self) -> bool {
        self.hashers.is_empty()
    }

    pub fn update(&mut self, data: &[u8]) {
        for (_, hasher) in &mut self.hashers {
            hasher.update(data);
        }
    }

    /// Algorithm name to lowercase hex digest
    pub fn finalize(self) -> HashMap<String, String> {
        self.hashers
            .into_iter()
            .map(|(algorithm, hasher)| (algorithm.as_str().to_string(), hasher.finalize_hex()))
            .collect()
    }
}

/// Shared view of the digests a [`DigestReader`] accumulates
#[derive(Debug, Clone)]
pub struct DigestHandle {
    digest: Arc<Mutex<Option<MultiDigest>>>,
    bytes_read: Arc<Mutex<u64>>,
}

impl DigestHandle {
    pub fn bytes_read(&self) -> u64 {
        *self.bytes_read.lock()
    }

    /// Digests of everything read so far. Returns an empty map on a second call.
    pub fn finalize(&self) -> HashMap<String, String> {
        self.digest
            .lock()
            .take()
            .map(MultiDigest::finalize)
            .unwrap_or_default()
    }
}

/// Reader adaptor that hashes bytes as they pass through
pub struct DigestReader<R> {
    inner: R,
    handle: DigestHandle,
}

impl<R: AsyncRead + Unpin> DigestReader<R> {
    pub fn new(inner: R, algorithms: &[DigestAlgorithm]) -> (Self, DigestHandle) {
        let handle = DigestHandle {
            digest: Arc::new(Mutex::new(Some(MultiDigest::new(algorithms)))),
            bytes_read: Arc::new(Mutex::new(0)),
        };
        (
            Self {
                inner,
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DigestReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let fresh = &buf.filled()[before..];
            if !fresh.is_empty() {
                if let Some(digest) = self.handle.digest.lock().as_mut() {
                    digest.update(fresh);
                }
                *self.handle.bytes_read.lock() += fresh.len() as u64;
            }
        }
        poll
    }
}
