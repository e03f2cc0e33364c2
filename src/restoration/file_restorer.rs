//! Restores a single generic file, unarchived, to the depositor's bucket.

use async_trait::async_trait;
use tracing::info;

use super::{best_restoration_source, AttributedError, RestorationContext, RestorationError};
use crate::archive::{DigestAlgorithm, DigestReader};
use crate::constants::providers;
use crate::logging::log_restore_operation;
use crate::models::{Checksum, GenericFile, RestorationObject};
use crate::worker::{Processor, RunOutcome};

pub struct FileRestorer {
    ctx: RestorationContext,
    work_item_id: i64,
    restoration_object: RestorationObject,
}

impl std::fmt::Debug for FileRestorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRestorer")
            .field("work_item_id", &self.work_item_id)
            .field("identifier", &self.restoration_object.identifier)
            .finish()
    }
}

/// Checksum the copy is verified against: sha256 when the registry has one,
/// otherwise the first checksum with a supported algorithm
fn verification_checksum(gf: &GenericFile) -> Option<(DigestAlgorithm, &Checksum)> {
    if let Some(checksum) = gf.latest_checksum(DigestAlgorithm::Sha256.as_str()) {
        return Some((DigestAlgorithm::Sha256, checksum));
    }
    gf.checksums.iter().find_map(|c| {
        DigestAlgorithm::parse(&c.algorithm)
            .ok()
            .and_then(|alg| gf.latest_checksum(&c.algorithm).map(|latest| (alg, latest)))
    })
}

impl FileRestorer {
    pub fn new(ctx: RestorationContext, work_item_id: i64, restoration_object: RestorationObject) -> Self {
        Self {
            ctx,
            work_item_id,
            restoration_object,
        }
    }

    async fn restore(&mut self) -> Result<(), AttributedError> {
        let identifier = self.restoration_object.identifier.clone();
        let fatal = |e: RestorationError| AttributedError::fatal(&identifier, e);

        let gf = self
            .ctx
            .registry
            .generic_file_get_by_identifier(&identifier)
            .await
            .map_err(|e| AttributedError::new(&identifier, e))?
            .ok_or_else(|| fatal(RestorationError::missing_record("GenericFile", &identifier)))?;
        let (algorithm, expected) = verification_checksum(&gf).ok_or_else(|| {
            fatal(RestorationError::Unverified {
                identifier: identifier.clone(),
            })
        })?;
        let size = u64::try_from(gf.size).map_err(|_| {
            fatal(RestorationError::invalid_identifier(
                &identifier,
                format!("negative size {}", gf.size),
            ))
        })?;

        let body = {
            let source = best_restoration_source(&gf, &self.ctx.storage_locations).map_err(fatal)?;
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
        let (reader, digests) = DigestReader::new(body, &[algorithm]);

        let bucket = self.restoration_object.restoration_target.clone();
        let target = self
            .ctx
            .object_stores
            .client_for(providers::AWS, &bucket)
            .map_err(|e| fatal(e.into()))?;
        target
            .put_object(&bucket, &identifier, Box::new(reader), Some(size))
            .await
            .map_err(|e| AttributedError::new(&identifier, e))?;

        let actual = digests
            .finalize()
            .remove(algorithm.as_str())
            .unwrap_or_default();
        if !actual.eq_ignore_ascii_case(&expected.digest) {
            return Err(fatal(RestorationError::DigestMismatch {
                identifier: identifier.clone(),
                algorithm: algorithm.to_string(),
                expected: expected.digest.clone(),
                actual,
            }));
        }

        let url = format!("{}{}/{}", self.ctx.config.url_prefix, bucket, identifier);
        self.restoration_object.file_size = gf.size;
        self.restoration_object.mark_restored(&url);
        log_restore_operation("restore_file", &identifier, Some(&bucket), "completed", Some(&url));
        Ok(())
    }
}

#[async_trait]
impl Processor for FileRestorer {
    async fn run(&mut self) -> RunOutcome {
        info!(
            work_item_id = self.work_item_id,
            identifier = %self.restoration_object.identifier,
            "📄 Restoring file"
        );
        match self.restore().await {
            Ok(()) => RunOutcome::success(1),
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
    use chrono::{Duration, Utc};

    fn checksum(algorithm: &str, digest: &str, age_days: i64) -> Checksum {
        Checksum {
            id: 0,
            algorithm: algorithm.to_string(),
            digest: digest.to_string(),
            datetime: Utc::now() - Duration::days(age_days),
            generic_file_id: 1,
        }
    }

    fn file_with(checksums: Vec<Checksum>) -> GenericFile {
        GenericFile {
            id: 1,
            identifier: "test.edu/bag/data/a.txt".to_string(),
            institution_id: 1,
            intellectual_object_id: 1,
            size: 3,
            state: "A".to_string(),
            storage_option: "Standard".to_string(),
            checksums,
            storage_records: Vec::new(),
            file_modified: None,
        }
    }

    #[test]
    fn test_prefers_sha256() {
        let gf = file_with(vec![checksum("md5", "m", 1), checksum("sha256", "s", 2)]);
        let (alg, c) = verification_checksum(&gf).unwrap();
        assert_eq!(alg, DigestAlgorithm::Sha256);
        assert_eq!(c.digest, "s");
    }

    #[test]
    fn test_falls_back_to_latest_of_first_supported() {
        let gf = file_with(vec![
            checksum("crc32", "x", 1),
            checksum("md5", "old", 5),
            checksum("md5", "new", 1),
        ]);
        let (alg, c) = verification_checksum(&gf).unwrap();
        assert_eq!(alg, DigestAlgorithm::Md5);
        assert_eq!(c.digest, "new");
        assert!(verification_checksum(&file_with(Vec::new())).is_none());
    }
}
