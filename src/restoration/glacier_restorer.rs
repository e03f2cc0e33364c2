//! # Glacier Restorer
//!
//! First phase of restoring content held only in cold storage: ask the
//! provider to thaw every file, then report whether all of them are readable
//! in the hot tier yet. Each file is in one of the [`FileRestoreState`]s and
//! the object counts as restored only when at least one file completed and
//! none are pending or failed.
//!
//! When files are still thawing the run returns a non-fatal error so the
//! worker requeues the item for a later recheck. The follow-on hot-tier
//! restoration item is created by the worker once this phase succeeds.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{best_restoration_source, AttributedError, FileBatches, RestorationContext, RestorationError};
use crate::cold_storage::{FileRestoreState, RestoreTally};
use crate::constants::RestorationType;
use crate::logging::log_restore_operation;
use crate::models::{GenericFile, ProcessingError, RestorationObject};
use crate::worker::{Processor, RunOutcome};

pub const NOT_YET_AVAILABLE: &str =
    "Initiated restore, but files are not yet available in S3. Requeued for later recheck.";

pub struct GlacierRestorer {
    ctx: RestorationContext,
    work_item_id: i64,
    restoration_object: RestorationObject,
    tally: RestoreTally,
    errors: Vec<ProcessingError>,
}

impl std::fmt::Debug for GlacierRestorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlacierRestorer")
            .field("work_item_id", &self.work_item_id)
            .field("identifier", &self.restoration_object.identifier)
            .field("tally", &self.tally)
            .finish()
    }
}

impl GlacierRestorer {
    pub fn new(ctx: RestorationContext, work_item_id: i64, restoration_object: RestorationObject) -> Self {
        Self {
            ctx,
            work_item_id,
            restoration_object,
            tally: RestoreTally::default(),
            errors: Vec::new(),
        }
    }

    /// Per-state counts from the last run
    pub fn tally(&self) -> RestoreTally {
        self.tally
    }

    fn push_error(&mut self, failure: AttributedError) {
        self.errors.push(failure.into_processing_error(self.work_item_id));
    }

    async fn restore_single_file(&mut self) {
        let identifier = self.restoration_object.identifier.clone();
        match self.ctx.registry.generic_file_get_by_identifier(&identifier).await {
            Ok(Some(gf)) => self.request_restoration(&gf).await,
            Ok(None) => {
                self.tally.record_failed_request();
                self.push_error(AttributedError::fatal(
                    &identifier,
                    RestorationError::missing_record("GenericFile", &identifier),
                ));
            }
            Err(e) => {
                self.tally.record_failed_request();
                self.push_error(AttributedError::fatal(&identifier, e));
            }
        }
    }

    async fn restore_all_files(&mut self) {
        let identifier = self.restoration_object.identifier.clone();
        let mut batches = FileBatches::new(
            self.ctx.registry.clone(),
            &identifier,
            self.ctx.config.batch_size,
        );
        loop {
            match batches.next_batch().await {
                Ok(Some(files)) => {
                    for gf in &files {
                        self.request_restoration(gf).await;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.push_error(AttributedError::new(&identifier, e));
                    return;
                }
            }
        }
    }

    async fn request_restoration(&mut self, gf: &GenericFile) {
        let url = match best_restoration_source(gf, &self.ctx.storage_locations) {
            Ok(source) => source.url().to_string(),
            Err(e) => {
                self.tally.record_failed_request();
                self.push_error(AttributedError::fatal(&gf.identifier, e));
                return;
            }
        };

        let status = match self.ctx.cold_storage.request_restore(&url).await {
            Ok(status) => status,
            Err(e) => {
                warn!(identifier = %gf.identifier, error = %e, "Restore request did not reach provider");
                self.tally.record_failed_request();
                self.push_error(AttributedError::new(&gf.identifier, e));
                return;
            }
        };

        let state = FileRestoreState::from_status(status);
        self.tally.record(state);
        info!(
            identifier = %gf.identifier,
            status = status,
            state = %state.describe(),
            "🧊 Cold storage answered restore request"
        );
        if state.is_fatal() {
            self.errors.push(ProcessingError::fatal(
                self.work_item_id,
                &gf.identifier,
                format!("Cold storage returned status {status}: {}", state.describe()),
            ));
        }
    }
}

#[async_trait]
impl Processor for GlacierRestorer {
    async fn run(&mut self) -> RunOutcome {
        self.tally = RestoreTally::default();
        self.errors.clear();

        match self.restoration_object.restoration_type {
            RestorationType::File => self.restore_single_file().await,
            RestorationType::Object => self.restore_all_files().await,
        }

        if self.errors.is_empty() && self.tally.fully_restored() {
            self.restoration_object.mark_files_restored();
            log_restore_operation(
                "restore_glacier",
                &self.restoration_object.identifier,
                None,
                "completed",
                Some(&format!("{} files in hot tier", self.tally.completed)),
            );
        }

        // Nothing failed but something is still thawing
        if self.errors.is_empty() && !self.restoration_object.all_files_restored {
            self.errors.push(ProcessingError::transient(
                self.work_item_id,
                &self.restoration_object.identifier,
                NOT_YET_AVAILABLE,
            ));
        }

        RunOutcome::new(self.tally.total(), std::mem::take(&mut self.errors))
    }

    fn restoration_object(&self) -> Option<&RestorationObject> {
        Some(&self.restoration_object)
    }
}
