//! # Bag Restorer
//!
//! Restores a whole intellectual object as a tarred bag in the depositor's
//! restore bucket.
//!
//! The archive is assembled in the foreground and uploaded by a spawned task
//! that reads the other end of the [`TarPipeWriter`] pipe, so a bag never has
//! to fit in memory or on disk. The run only reports success after the upload
//! task has returned and its result has been checked.
//!
//! Archive layout, in write order:
//!
//! 1. `<bag>/bagit.txt`, generated
//! 2. every active preserved file, named by its identifier without the
//!    institution prefix, with parent directories emitted once each
//! 3. `<bag>/manifest-<alg>.txt` for payload files
//! 4. `<bag>/tagmanifest-<alg>.txt` for tag files and the payload manifests
//!
//! Preserved manifests and `bagit.txt` are skipped in step 2 because they are
//! regenerated from the digests computed in transit.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{best_restoration_source, AttributedError, FileBatches, RestorationContext, RestorationError};
use crate::archive::{ArchiveEntry, ArchiveError, DigestAlgorithm, TarPipeWriter};
use crate::constants::providers;
use crate::logging::log_restore_operation;
use crate::models::{GenericFile, RestorationObject};
use crate::storage::{ObjectInfo, StorageResult};
use crate::worker::{Processor, RunOutcome};

pub const BAGIT_TXT: &str = "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManifestKind {
    Payload,
    Tag,
}

impl ManifestKind {
    fn of(path_in_bag: &str) -> Self {
        if path_in_bag.starts_with("data/") {
            ManifestKind::Payload
        } else {
            ManifestKind::Tag
        }
    }

    fn file_name(&self, algorithm: DigestAlgorithm) -> String {
        match self {
            ManifestKind::Payload => format!("manifest-{algorithm}.txt"),
            ManifestKind::Tag => format!("tagmanifest-{algorithm}.txt"),
        }
    }
}

/// Manifest lines collected while files stream past
#[derive(Debug, Default)]
struct Manifests {
    payload: BTreeMap<&'static str, String>,
    tag: BTreeMap<&'static str, String>,
}

impl Manifests {
    fn append(&mut self, kind: ManifestKind, algorithm: DigestAlgorithm, digest: &str, path: &str) {
        let lines = match kind {
            ManifestKind::Payload => &mut self.payload,
            ManifestKind::Tag => &mut self.tag,
        }
        .entry(algorithm.as_str())
        .or_default();
        lines.push_str(&format!("{digest}  {path}\n"));
    }

    fn contents(&self, kind: ManifestKind, algorithm: DigestAlgorithm) -> String {
        match kind {
            ManifestKind::Payload => &self.payload,
            ManifestKind::Tag => &self.tag,
        }
        .get(algorithm.as_str())
        .cloned()
        .unwrap_or_default()
    }
}

/// Files regenerated by the restorer rather than copied from preservation
fn is_regenerated(path_in_bag: &str) -> bool {
    path_in_bag == "bagit.txt"
        || ((path_in_bag.starts_with("manifest-") || path_in_bag.starts_with("tagmanifest-"))
            && path_in_bag.ends_with(".txt")
            && !path_in_bag.contains('/'))
}

pub struct BagRestorer {
    ctx: RestorationContext,
    work_item_id: i64,
    restoration_object: RestorationObject,
    manifests: Manifests,
}

impl std::fmt::Debug for BagRestorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BagRestorer")
            .field("work_item_id", &self.work_item_id)
            .field("identifier", &self.restoration_object.identifier)
            .finish()
    }
}

impl BagRestorer {
    pub fn new(ctx: RestorationContext, work_item_id: i64, restoration_object: RestorationObject) -> Self {
        Self {
            ctx,
            work_item_id,
            restoration_object,
            manifests: Manifests::default(),
        }
    }

    /// Object key of the restored bag
    pub fn archive_key(&self) -> String {
        format!("{}.tar", self.restoration_object.identifier)
    }

    async fn restore(&mut self) -> Result<usize, AttributedError> {
        let identifier = self.restoration_object.identifier.clone();
        let bag_name = self
            .restoration_object
            .obj_name()
            .map(str::to_string)
            .ok_or_else(|| {
                AttributedError::fatal(
                    &identifier,
                    RestorationError::invalid_identifier(&identifier, "missing institution prefix"),
                )
            })?;
        let algorithms = DigestAlgorithm::parse_all(self.restoration_object.manifest_algorithms())
            .map_err(|e| AttributedError::fatal(&identifier, e))?;

        // Manifests from an earlier attempt of this job must not leak in
        self.manifests = Manifests::default();

        let bucket = self.restoration_object.restoration_target.clone();
        let key = self.archive_key();
        let client = self
            .ctx
            .object_stores
            .client_for(providers::AWS, &bucket)
            .map_err(|e| AttributedError::fatal(&identifier, e))?;

        let mut writer = TarPipeWriter::new(self.ctx.config.pipe_buffer_bytes);
        let Some(reader) = writer.take_reader() else {
            return Err(AttributedError::fatal(
                &identifier,
                RestorationError::Upload {
                    key,
                    message: "archive reader already taken".to_string(),
                },
            ));
        };
        info!(
            identifier = %identifier,
            bucket = %bucket,
            "📦 Initialized uploader for restored bag"
        );
        let upload: JoinHandle<StorageResult<ObjectInfo>> = {
            let bucket = bucket.clone();
            let key = key.clone();
            tokio::spawn(async move { client.put_object(&bucket, &key, Box::new(reader), None).await })
        };

        let assembled = match self.assemble(&mut writer, &bag_name, &algorithms).await {
            Ok(count) => writer
                .finish()
                .await
                .map(|_| count)
                .map_err(|e| AttributedError::fatal(&identifier, e)),
            Err(failure) => {
                // With the upload still reading, closing the pipe would let it
                // store a truncated archive
                let upload_gone = matches!(
                    failure.error,
                    RestorationError::Archive(ArchiveError::Pipe { .. })
                );
                if !upload_gone {
                    upload.abort();
                }
                Err(failure)
            }
        };

        let uploaded = match upload.await {
            Ok(result) => result.map_err(|e| AttributedError::new(&identifier, e)),
            Err(join_error) => Err(AttributedError::new(
                &identifier,
                RestorationError::Upload {
                    key: key.clone(),
                    message: join_error.to_string(),
                },
            )),
        };

        match (assembled, uploaded) {
            (Ok(file_count), Ok(info)) => {
                let url = format!("{}{}/{}", self.ctx.config.url_prefix, bucket, key);
                self.restoration_object.file_size = i64::try_from(info.size).unwrap_or(i64::MAX);
                self.restoration_object.mark_restored(&url);
                log_restore_operation("restore_bag", &identifier, Some(&bucket), "completed", Some(&url));
                Ok(file_count)
            }
            (Ok(_), Err(upload_failure)) => {
                error!(identifier = %identifier, error = %upload_failure.error, "Upload of restored bag failed");
                Err(upload_failure)
            }
            (Err(failure), Err(upload_failure))
                if matches!(failure.error, RestorationError::Archive(ArchiveError::Pipe { .. })) =>
            {
                warn!(identifier = %identifier, "Archive pipe closed because the upload failed");
                Err(upload_failure)
            }
            (Err(failure), _) => {
                error!(
                    identifier = %failure.identifier,
                    error = %failure.error,
                    "Restoration of bag aborted"
                );
                Err(failure)
            }
        }
    }

    async fn assemble(
        &mut self,
        writer: &mut TarPipeWriter,
        bag_name: &str,
        algorithms: &[DigestAlgorithm],
    ) -> Result<usize, AttributedError> {
        let identifier = self.restoration_object.identifier.clone();
        let mut file_count = 0;

        self.add_generated(writer, bag_name, "bagit.txt", BAGIT_TXT.as_bytes(), algorithms)
            .await?;
        file_count += 1;

        let mut batches = FileBatches::new(
            self.ctx.registry.clone(),
            &identifier,
            self.ctx.config.batch_size,
        );
        loop {
            let files = match batches.next_batch().await {
                Ok(Some(files)) => files,
                Ok(None) => break,
                Err(e) => return Err(AttributedError::new(&identifier, e)),
            };
            for gf in &files {
                match gf.path_in_bag() {
                    Some(path) if is_regenerated(path) => {
                        debug!(identifier = %gf.identifier, "Skipping file that is regenerated on restore");
                        continue;
                    }
                    _ => {}
                }
                self.add_preserved_file(writer, gf, algorithms).await?;
                file_count += 1;
            }
        }

        // Payload manifests go before tag manifests, which list their digests
        for algorithm in algorithms {
            let name = ManifestKind::Payload.file_name(*algorithm);
            let contents = self.manifests.contents(ManifestKind::Payload, *algorithm);
            self.add_generated(writer, bag_name, &name, contents.as_bytes(), algorithms)
                .await?;
            file_count += 1;
        }
        for algorithm in algorithms {
            let name = ManifestKind::Tag.file_name(*algorithm);
            let contents = self.manifests.contents(ManifestKind::Tag, *algorithm);
            self.add_generated(writer, bag_name, &name, contents.as_bytes(), &[])
                .await?;
            file_count += 1;
        }
        Ok(file_count)
    }

    /// Adds a file generated in memory. Digests computed for it are listed in
    /// the tag manifests.
    async fn add_generated(
        &mut self,
        writer: &mut TarPipeWriter,
        bag_name: &str,
        path_in_bag: &str,
        contents: &[u8],
        algorithms: &[DigestAlgorithm],
    ) -> Result<(), AttributedError> {
        let name = format!("{bag_name}/{path_in_bag}");
        let fail = |e: ArchiveError| AttributedError::fatal(&name, e);
        let now = Utc::now();
        writer.ensure_parent_directories(&name, now).await.map_err(fail)?;
        let mut entry = ArchiveEntry::new(&name, contents.len() as i64);
        entry.modified = now;
        let mut reader = contents;
        let digests = writer
            .add_file(&entry, &mut reader, algorithms)
            .await
            .map_err(fail)?;
        for algorithm in algorithms {
            if let Some(digest) = digests.get(algorithm.as_str()) {
                self.manifests
                    .append(ManifestKind::Tag, *algorithm, digest, path_in_bag);
            }
        }
        Ok(())
    }

    async fn add_preserved_file(
        &mut self,
        writer: &mut TarPipeWriter,
        gf: &GenericFile,
        algorithms: &[DigestAlgorithm],
    ) -> Result<(), AttributedError> {
        let fatal = |e: RestorationError| AttributedError::fatal(&gf.identifier, e);
        let (Some(entry_name), Some(path_in_bag)) = (gf.path_minus_institution(), gf.path_in_bag()) else {
            return Err(fatal(RestorationError::invalid_identifier(
                &gf.identifier,
                "expected institution/bag/path",
            )));
        };

        let mut reader = {
            let source =
                best_restoration_source(gf, &self.ctx.storage_locations).map_err(fatal)?;
            let client = self
                .ctx
                .object_stores
                .client_for(&source.location.provider, &source.location.bucket)
                .map_err(|e| fatal(e.into()))?;
            client
                .get_object(&source.location.bucket, source.key())
                .await
                .map_err(|e| fatal(e.into()))?
        };

        let modified = gf.file_modified.unwrap_or_else(Utc::now);
        writer
            .ensure_parent_directories(entry_name, modified)
            .await
            .map_err(|e| fatal(e.into()))?;
        let mut entry = ArchiveEntry::new(entry_name, gf.size);
        entry.modified = modified;
        let digests = writer
            .add_file(&entry, &mut reader, algorithms)
            .await
            .map_err(|e| fatal(e.into()))?;

        self.record_digests(gf, path_in_bag, algorithms, &digests)
            .map_err(fatal)?;
        debug!(identifier = %gf.identifier, "Added preserved file to bag");
        Ok(())
    }

    /// Checks digests computed in transit against the registry and adds them
    /// to the manifests. Algorithms the registry has no checksum for are
    /// recorded unverified; at least one digest must be recorded.
    fn record_digests(
        &mut self,
        gf: &GenericFile,
        path_in_bag: &str,
        algorithms: &[DigestAlgorithm],
        digests: &HashMap<String, String>,
    ) -> Result<(), RestorationError> {
        let kind = ManifestKind::of(path_in_bag);
        let mut recorded = false;
        for algorithm in algorithms {
            let Some(digest) = digests.get(algorithm.as_str()) else {
                continue;
            };
            if let Some(expected) = gf.latest_checksum(algorithm.as_str()) {
                if !expected.digest.eq_ignore_ascii_case(digest) {
                    return Err(RestorationError::DigestMismatch {
                        identifier: gf.identifier.clone(),
                        algorithm: algorithm.to_string(),
                        expected: expected.digest.clone(),
                        actual: digest.clone(),
                    });
                }
            }
            self.manifests.append(kind, *algorithm, digest, path_in_bag);
            recorded = true;
        }
        if !recorded {
            return Err(RestorationError::Unverified {
                identifier: gf.identifier.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Processor for BagRestorer {
    async fn run(&mut self) -> RunOutcome {
        info!(
            work_item_id = self.work_item_id,
            identifier = %self.restoration_object.identifier,
            profile = %self.restoration_object.bagit_profile_identifier,
            "📦 Restoring bag"
        );
        match self.restore().await {
            Ok(file_count) => RunOutcome::success(file_count),
            Err(failure) => RunOutcome::new(0, vec![failure.into_processing_error(self.work_item_id)]),
        }
    }

    fn restoration_object(&self) -> Option<&RestorationObject> {
        Some(&self.restoration_object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_kind() {
        assert_eq!(ManifestKind::of("data/a.txt"), ManifestKind::Payload);
        assert_eq!(ManifestKind::of("bag-info.txt"), ManifestKind::Tag);
        assert_eq!(ManifestKind::of("custom_tags/x.txt"), ManifestKind::Tag);
        assert_eq!(
            ManifestKind::Tag.file_name(DigestAlgorithm::Sha256),
            "tagmanifest-sha256.txt"
        );
    }

    #[test]
    fn test_regenerated_files() {
        assert!(is_regenerated("bagit.txt"));
        assert!(is_regenerated("manifest-md5.txt"));
        assert!(is_regenerated("tagmanifest-sha256.txt"));
        assert!(!is_regenerated("bag-info.txt"));
        assert!(!is_regenerated("data/manifest-md5.txt"));
    }

    #[test]
    fn test_manifest_lines() {
        let mut manifests = Manifests::default();
        manifests.append(ManifestKind::Payload, DigestAlgorithm::Md5, "abc", "data/a.txt");
        manifests.append(ManifestKind::Payload, DigestAlgorithm::Md5, "def", "data/b.txt");
        assert_eq!(
            manifests.contents(ManifestKind::Payload, DigestAlgorithm::Md5),
            "abc  data/a.txt\ndef  data/b.txt\n"
        );
        assert_eq!(manifests.contents(ManifestKind::Tag, DigestAlgorithm::Md5), "");
    }
}
