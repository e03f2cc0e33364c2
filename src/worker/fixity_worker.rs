//! Fixity checks on single files. Messages carry a file identifier and the
//! work item is built in memory, so nothing here is saved to the registry.

use async_trait::async_trait;

use super::capability::WorkerCapability;
use super::context::WorkerContext;
use super::processor::Processor;
use super::skip::SkipReason;
use super::task::Task;
use crate::constants::Action;
use crate::fixity::FixityChecker;
use crate::models::{ProcessIdentity, ProcessingError, WorkItem};

#[derive(Debug, Clone, Copy, Default)]
pub struct FixityWorker;

#[async_trait]
impl WorkerCapability for FixityWorker {
    fn name(&self) -> &'static str {
        "fixity_checker"
    }

    fn expected_action(&self) -> Action {
        Action::FixityCheck
    }

    fn expects_file_identifier(&self) -> bool {
        true
    }

    // In-memory items carry no retry history or lease; only the dedup ring applies
    fn should_skip(&self, _item: &mut WorkItem, _identity: &ProcessIdentity) -> Option<SkipReason> {
        None
    }

    async fn build_processor(
        &self,
        ctx: &WorkerContext,
        item: &WorkItem,
    ) -> Result<Box<dyn Processor>, ProcessingError> {
        Ok(Box::new(FixityChecker::new(
            ctx.restoration.clone(),
            item.generic_file_identifier.clone(),
        )))
    }

    fn success_note(&self, task: &Task) -> String {
        format!("Fixity check passed for {}.", task.work_item.generic_file_identifier)
    }
}
