//! # Worker Capability
//!
//! What a concrete worker contributes to the shared engine: which items it
//! accepts, how it builds a processor for one, and what happens on success.
//! The engine owns everything else (admission, queues, bookkeeping).

use async_trait::async_trait;

use super::context::WorkerContext;
use super::processor::Processor;
use super::skip::{check_skip, SkipReason};
use super::task::Task;
use crate::constants::{Action, RestorationType};
use crate::models::{ProcessIdentity, ProcessingError, WorkItem};

#[async_trait]
pub trait WorkerCapability: Send + Sync + 'static {
    /// Name for logs
    fn name(&self) -> &'static str;

    fn expected_action(&self) -> Action;

    /// Restoration type this worker is limited to, if any
    fn restoration_type(&self) -> Option<RestorationType> {
        None
    }

    /// Messages carry a file identifier instead of a work item id
    fn expects_file_identifier(&self) -> bool {
        false
    }

    /// Retry, action, type, completion and lease checks in that order. May
    /// update the item's note, status and retry flag locally.
    fn should_skip(&self, item: &mut WorkItem, identity: &ProcessIdentity) -> Option<SkipReason> {
        check_skip(item, self.expected_action(), self.restoration_type(), identity)
    }

    async fn build_processor(
        &self,
        ctx: &WorkerContext,
        item: &WorkItem,
    ) -> Result<Box<dyn Processor>, ProcessingError>;

    /// Note written onto the work item when it succeeds
    fn success_note(&self, task: &Task) -> String;

    /// Runs after the success bookkeeping has been saved and before the
    /// message is acknowledged. Anything it changes it must save itself.
    async fn after_success(&self, _ctx: &WorkerContext, _task: &mut Task) {}
}
