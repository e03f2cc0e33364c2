//! # Fixity Check
//!
//! Streams one preserved file from its best source through a sha256 digest
//! and compares the result with the latest sha256 the registry holds.
//! Files kept only in cold storage are skipped; reading them would require a
//! thaw first.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::archive::{DigestAlgorithm, DigestReader};
use crate::models::GenericFile;
use crate::restoration::{best_restoration_source, AttributedError, RestorationContext, RestorationError};
use crate::storage::StorageError;
use crate::worker::{Processor, RunOutcome};

/// Result of the last check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixityOutcome {
    Matched { digest: String, url: String },
    Mismatched { expected: String, actual: String, url: String },
    /// Only held in cold storage
    Skipped,
}

pub struct FixityChecker {
    ctx: RestorationContext,
    generic_file_identifier: String,
    outcome: Option<FixityOutcome>,
}

impl std::fmt::Debug for FixityChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixityChecker")
            .field("identifier", &self.generic_file_identifier)
            .field("outcome", &self.outcome)
            .finish()
    }
}

fn is_cold_storage_only(gf: &GenericFile) -> bool {
    gf.storage_option.starts_with("Glacier")
}

impl FixityChecker {
    pub fn new(ctx: RestorationContext, generic_file_identifier: impl Into<String>) -> Self {
        Self {
            ctx,
            generic_file_identifier: generic_file_identifier.into(),
            outcome: None,
        }
    }

    pub fn outcome(&self) -> Option<&FixityOutcome> {
        self.outcome.as_ref()
    }

    async fn check(&self) -> Result<FixityOutcome, AttributedError> {
        let identifier = self.generic_file_identifier.as_str();
        let fatal = |e: RestorationError| AttributedError::fatal(identifier, e);

        let gf = self
            .ctx
            .registry
            .generic_file_get_by_identifier(identifier)
            .await
            .map_err(|e| AttributedError::new(identifier, e))?
            .ok_or_else(|| fatal(RestorationError::missing_record("GenericFile", identifier)))?;
        if is_cold_storage_only(&gf) {
            info!(identifier = %identifier, storage_option = %gf.storage_option, "Skipping fixity check for cold-storage-only file");
            return Ok(FixityOutcome::Skipped);
        }
        let expected = gf
            .latest_checksum(DigestAlgorithm::Sha256.as_str())
            .map(|c| c.digest.clone())
            .ok_or_else(|| {
                fatal(RestorationError::Unverified {
                    identifier: identifier.to_string(),
                })
            })?;

        let source = best_restoration_source(&gf, &self.ctx.storage_locations).map_err(fatal)?;
        let url = source.url().to_string();
        let bucket = source.location.bucket.as_str();
        let client = self
            .ctx
            .object_stores
            .client_for(&source.location.provider, bucket)
            .map_err(|e| fatal(e.into()))?;
        let body = client
            .get_object(bucket, source.key())
            .await
            .map_err(|e| AttributedError::new(identifier, e))?;

        let (mut reader, digests) = DigestReader::new(body, &[DigestAlgorithm::Sha256]);
        let mut sink = tokio::io::sink();
        tokio::io::copy(&mut reader, &mut sink).await.map_err(|e| {
            AttributedError::new(
                identifier,
                StorageError::operation("get_object", bucket, source.key(), e.to_string()),
            )
        })?;

        let actual = digests
            .finalize()
            .remove(DigestAlgorithm::Sha256.as_str())
            .unwrap_or_default();
        if actual.eq_ignore_ascii_case(&expected) {
            Ok(FixityOutcome::Matched { digest: actual, url })
        } else {
            Ok(FixityOutcome::Mismatched { expected, actual, url })
        }
    }
}

#[async_trait]
impl Processor for FixityChecker {
    async fn run(&mut self) -> RunOutcome {
        let result = self.check().await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(failure) => return RunOutcome::new(0, vec![failure.into_processing_error(-1)]),
        };
        self.outcome = Some(outcome.clone());
        match outcome {
            FixityOutcome::Matched { digest, url } => {
                info!(identifier = %self.generic_file_identifier, url = %url, digest = %digest, "✅ Fixity matched");
                RunOutcome::success(1)
            }
            FixityOutcome::Mismatched { expected, actual, url } => {
                warn!(identifier = %self.generic_file_identifier, url = %url, "🚨 Fixity mismatch");
                let failure = AttributedError::fatal(
                    &self.generic_file_identifier,
                    RestorationError::DigestMismatch {
                        identifier: self.generic_file_identifier.clone(),
                        algorithm: DigestAlgorithm::Sha256.to_string(),
                        expected,
                        actual,
                    },
                );
                RunOutcome::new(1, vec![failure.into_processing_error(-1)])
            }
            FixityOutcome::Skipped => RunOutcome::success(0),
        }
    }
}
