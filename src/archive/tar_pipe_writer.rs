//! # Tar Pipe Writer
//!
//! Writes a tar stream into one end of an in-memory duplex pipe. The other end
//! is handed to a consumer (usually an upload) that reads while entries are
//! still being added. Writes block once the pipe buffer is full until the
//! consumer catches up.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tracing::debug;

use super::digest::{DigestAlgorithm, MultiDigest};
use super::{ArchiveError, ArchiveResult};

const BLOCK_SIZE: u64 = 512;
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Header fields for one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    /// Signed so that bad registry data is rejected rather than wrapped
    pub size: i64,
    pub mode: u32,
    pub modified: DateTime<Utc>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, size: i64) -> Self {
        Self {
            name: name.into(),
            size,
            mode: 0o755,
            modified: Utc::now(),
        }
    }

    /// Checked before any byte of the entry is written
    pub fn validate(&self) -> ArchiveResult<u64> {
        if self.name.is_empty() {
            return Err(ArchiveError::invalid_header(&self.name, "name is empty"));
        }
        u64::try_from(self.size).map_err(|_| {
            ArchiveError::invalid_header(&self.name, format!("negative size {}", self.size))
        })
    }
}

#[derive(Debug)]
pub struct TarPipeWriter {
    writer: DuplexStream,
    reader: Option<DuplexStream>,
    directories: HashSet<String>,
    bytes_written: u64,
}

impl TarPipeWriter {
    /// `buffer_size` bounds how far the writer may run ahead of the reader
    pub fn new(buffer_size: usize) -> Self {
        let (writer, reader) = tokio::io::duplex(buffer_size.max(BLOCK_SIZE as usize));
        Self {
            writer,
            reader: Some(reader),
            directories: HashSet::new(),
            bytes_written: 0,
        }
    }

    /// Consuming end of the pipe. Available once.
    pub fn take_reader(&mut self) -> Option<DuplexStream> {
        self.reader.take()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Appends a regular file. Exactly `entry.size` bytes must come out of
    /// `reader`. Returns algorithm name to hex digest for `algorithms`.
    pub async fn add_file<R>(
        &mut self,
        entry: &ArchiveEntry,
        reader: &mut R,
        algorithms: &[DigestAlgorithm],
    ) -> ArchiveResult<HashMap<String, String>>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let size = entry.validate()?;
        let header = header_blocks(entry, tar::EntryType::Regular, size)?;
        self.write(&entry.name, &header).await?;

        let mut digest = MultiDigest::new(algorithms);
        // One byte past the header size reveals an oversized source
        let mut limited = (&mut *reader).take(size + 1);
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut copied: u64 = 0;
        loop {
            let n = limited
                .read(&mut buf)
                .await
                .map_err(|e| ArchiveError::source(&entry.name, e))?;
            if n == 0 {
                break;
            }
            if copied + n as u64 > size {
                return Err(ArchiveError::SizeMismatch {
                    name: entry.name.clone(),
                    expected: size,
                    actual: copied + n as u64,
                });
            }
            digest.update(&buf[..n]);
            self.write(&entry.name, &buf[..n]).await?;
            copied += n as u64;
        }
        if copied != size {
            return Err(ArchiveError::SizeMismatch {
                name: entry.name.clone(),
                expected: size,
                actual: copied,
            });
        }

        let padding = (BLOCK_SIZE - size % BLOCK_SIZE) % BLOCK_SIZE;
        if padding > 0 {
            self.write(&entry.name, &vec![0u8; padding as usize]).await?;
        }
        debug!(name = %entry.name, size = size, "🗃️ Added file to archive");
        Ok(digest.finalize())
    }

    /// Writes a directory header for `path` unless one was already written.
    /// Returns true when a header was written.
    pub async fn ensure_directory_entry(&mut self, path: &str, modified: DateTime<Utc>) -> ArchiveResult<bool> {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ArchiveError::invalid_header(path, "directory name is empty"));
        }
        if self.directories.contains(trimmed) {
            return Ok(false);
        }
        let entry = ArchiveEntry {
            name: format!("{trimmed}/"),
            size: 0,
            mode: 0o755,
            modified,
        };
        let header = header_blocks(&entry, tar::EntryType::Directory, 0)?;
        self.write(&entry.name, &header).await?;
        self.directories.insert(trimmed.to_string());
        Ok(true)
    }

    /// Ensures a directory entry for every ancestor of `file_name`, outermost
    /// first
    pub async fn ensure_parent_directories(&mut self, file_name: &str, modified: DateTime<Utc>) -> ArchiveResult<()> {
        let parts: Vec<&str> = file_name.split('/').collect();
        for depth in 1..parts.len() {
            let dir = parts[..depth].join("/");
            if !dir.is_empty() {
                self.ensure_directory_entry(&dir, modified).await?;
            }
        }
        Ok(())
    }

    /// Writes the end-of-archive marker and closes the pipe. The reader sees EOF
    /// after the last byte.
    pub async fn finish(mut self) -> ArchiveResult<u64> {
        let trailer = [0u8; 2 * BLOCK_SIZE as usize];
        self.write("end of archive", &trailer).await?;
        self.writer
            .shutdown()
            .await
            .map_err(|e| ArchiveError::pipe("end of archive", e))?;
        debug!(bytes = self.bytes_written, "🗃️ Archive finished");
        Ok(self.bytes_written)
    }

    async fn write(&mut self, name: &str, data: &[u8]) -> ArchiveResult<()> {
        self.writer
            .write_all(data)
            .await
            .map_err(|e| ArchiveError::pipe(name, e))?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }
}

const USTAR_NAME_LEN: usize = 100;
const PAX_HEADER_NAME: &[u8] = b"././@PaxHeader";

/// Header blocks for one entry. A name that does not fit the ustar name and
/// prefix fields travels in a PAX `path` record ahead of the real header,
/// which then carries a truncated name.
fn header_blocks(entry: &ArchiveEntry, kind: tar::EntryType, size: u64) -> ArchiveResult<Vec<u8>> {
    let mut header = base_header(entry, kind, size);
    if header.set_path(&entry.name).is_ok() {
        header.set_cksum();
        return Ok(header.as_bytes().to_vec());
    }
    if entry.name.contains('\0') || entry.name.split('/').any(|part| part == "..") {
        return Err(ArchiveError::invalid_header(&entry.name, "name is not a relative archive path"));
    }

    let record = pax_record("path", &entry.name);
    let mut pax = base_header(entry, tar::EntryType::XHeader, record.len() as u64);
    pax.set_mode(0o644);
    set_raw_name(&mut pax, PAX_HEADER_NAME);
    pax.set_cksum();
    // A failed set_path may leave part of the name behind
    let mut header = base_header(entry, kind, size);
    set_raw_name(&mut header, entry.name.as_bytes());
    header.set_cksum();

    let padding = (BLOCK_SIZE - record.len() as u64 % BLOCK_SIZE) % BLOCK_SIZE;
    let mut blocks = Vec::with_capacity(3 * BLOCK_SIZE as usize + record.len());
    blocks.extend_from_slice(pax.as_bytes());
    blocks.extend_from_slice(&record);
    blocks.resize(blocks.len() + padding as usize, 0);
    blocks.extend_from_slice(header.as_bytes());
    Ok(blocks)
}

fn base_header(entry: &ArchiveEntry, kind: tar::EntryType, size: u64) -> tar::Header {
    let mut header = tar::Header::new_ustar();
    header.set_entry_type(kind);
    header.set_size(size);
    header.set_mode(entry.mode);
    header.set_mtime(entry.modified.timestamp().max(0) as u64);
    header
}

/// Writes at most the first 100 bytes of `name` into the ustar name field
fn set_raw_name(header: &mut tar::Header, name: &[u8]) {
    let field = &mut header.as_old_mut().name;
    let len = name.len().min(USTAR_NAME_LEN);
    field.fill(0);
    field[..len].copy_from_slice(&name[..len]);
}

/// One PAX extended header record: `"<len> <key>=<value>\n"`, where `len`
/// counts the whole record including its own digits
fn pax_record(key: &str, value: &str) -> Vec<u8> {
    let body = format!(" {key}={value}\n");
    let mut len = body.len();
    loop {
        let total = body.len() + len.to_string().len();
        if total == len {
            break;
        }
        len = total;
    }
    format!("{len}{body}").into_bytes()
}
