//! # Restoration Workers
//!
//! The three restoration stages share one capability parameterized by kind:
//! bag restoration and single-file restoration read from the hot tier, and
//! cold-storage restoration thaws files and then hands the item on to one of
//! the other two.

use async_trait::async_trait;
use tracing::{error, info};

use super::capability::WorkerCapability;
use super::context::WorkerContext;
use super::processor::Processor;
use super::task::Task;
use crate::constants::{topics, Action, RestorationType};
use crate::models::{ProcessingError, RestorationObject, RestorationSource, WorkItem};
use crate::restoration::{AttributedError, BagRestorer, FileRestorer, GlacierRestorer, RestorationError};

pub const FOLLOW_ON_FAILED_NOTE: &str =
    " Object(s) are in S3 but worker was unable to create next restore item. Create it manually.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorationWorker {
    /// Whole bag, tarred, from the hot tier
    Object,
    /// One file, as-is, from the hot tier
    File,
    /// Thaw from cold storage, either kind
    ColdStorage,
}

impl RestorationWorker {
    fn source(&self) -> RestorationSource {
        match self {
            RestorationWorker::ColdStorage => RestorationSource::Glacier,
            _ => RestorationSource::S3,
        }
    }

    /// Job description for `item`: what to restore and into which bucket
    async fn restoration_object(
        &self,
        ctx: &WorkerContext,
        item: &WorkItem,
    ) -> Result<RestorationObject, RestorationError> {
        let object = ctx
            .registry()
            .intellectual_object_get_by_identifier(&item.object_identifier)
            .await?
            .ok_or_else(|| RestorationError::missing_record("IntellectualObject", &item.object_identifier))?;
        let institution = ctx.institution(object.institution_id).await?;

        let (restoration_type, identifier) = if item.generic_file_identifier.is_empty() {
            (RestorationType::Object, item.object_identifier.clone())
        } else {
            (RestorationType::File, item.generic_file_identifier.clone())
        };
        let mut job = RestorationObject::new(
            identifier,
            restoration_type,
            self.source(),
            institution.restore_bucket,
        );
        job.bagit_profile_identifier = object.bagit_profile_identifier;
        Ok(job)
    }

    async fn queue_follow_on(&self, ctx: &WorkerContext, task: &mut Task) {
        let next = task.work_item.follow_on_restoration();
        match ctx.create_or_update_work_item(&next).await {
            Ok(created) => {
                let topic = match created.action {
                    Action::RestoreFile => topics::RESTORE_FILE,
                    _ => topics::RESTORE_OBJECT,
                };
                info!(
                    work_item_id = task.work_item.id,
                    follow_on_id = created.id,
                    topic = topic,
                    "🔁 Created hot-tier restoration item"
                );
                if let Err(e) = ctx.broker.send_message(topic, &created.id.to_string()).await {
                    error!(follow_on_id = created.id, topic = topic, error = %e, "Could not queue hot-tier restoration item");
                }
            }
            Err(e) => {
                error!(
                    work_item_id = task.work_item.id,
                    identifier = %task.work_item.object_identifier,
                    error = %e,
                    "Could not create hot-tier restoration item"
                );
                task.work_item.note.push_str(FOLLOW_ON_FAILED_NOTE);
                task.work_item.needs_admin_review = true;
                ctx.save_work_item(&mut task.work_item).await;
            }
        }
    }
}

#[async_trait]
impl WorkerCapability for RestorationWorker {
    fn name(&self) -> &'static str {
        match self {
            RestorationWorker::Object => "bag_restorer",
            RestorationWorker::File => "file_restorer",
            RestorationWorker::ColdStorage => "glacier_restorer",
        }
    }

    fn expected_action(&self) -> Action {
        match self {
            RestorationWorker::Object => Action::RestoreObject,
            RestorationWorker::File => Action::RestoreFile,
            RestorationWorker::ColdStorage => Action::GlacierRestore,
        }
    }

    fn restoration_type(&self) -> Option<RestorationType> {
        match self {
            RestorationWorker::Object => Some(RestorationType::Object),
            RestorationWorker::File => Some(RestorationType::File),
            RestorationWorker::ColdStorage => None,
        }
    }

    async fn build_processor(
        &self,
        ctx: &WorkerContext,
        item: &WorkItem,
    ) -> Result<Box<dyn Processor>, ProcessingError> {
        let job = self
            .restoration_object(ctx, item)
            .await
            .map_err(|e| AttributedError::new(&item.object_identifier, e).into_processing_error(item.id))?;
        let restoration = ctx.restoration.clone();
        let processor: Box<dyn Processor> = match self {
            RestorationWorker::Object => Box::new(BagRestorer::new(restoration, item.id, job)),
            RestorationWorker::File => Box::new(FileRestorer::new(restoration, item.id, job)),
            RestorationWorker::ColdStorage => Box::new(GlacierRestorer::new(restoration, item.id, job)),
        };
        Ok(processor)
    }

    fn success_note(&self, task: &Task) -> String {
        let url = task.restoration_object().map(|r| r.url.as_str()).unwrap_or_default();
        match self {
            RestorationWorker::Object => {
                format!("Object {} restored to {}.", task.work_item.object_identifier, url)
            }
            RestorationWorker::File => {
                format!("File {} restored to {}.", task.work_item.generic_file_identifier, url)
            }
            RestorationWorker::ColdStorage => format!(
                "Object {} restored from Glacier to S3.",
                task.work_item.object_identifier
            ),
        }
    }

    async fn after_success(&self, ctx: &WorkerContext, task: &mut Task) {
        if *self == RestorationWorker::ColdStorage {
            self.queue_follow_on(ctx, task).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryResultCache;
    use crate::cold_storage::InMemoryColdStorageClient;
    use crate::config::{PersistenceConfig, RestorationConfig};
    use crate::constants::Stage;
    use crate::messaging::{BrokerMessage, InMemoryMessagingService, MessageId, ReceiptHandle};
    use crate::models::{Institution, IntellectualObject, ProcessIdentity, WorkResult};
    use crate::registry::InMemoryRegistry;
    use crate::restoration::RestorationContext;
    use crate::storage::ObjectStoreRegistry;
    use crate::worker::RunOutcome;
    use chrono::Utc;
    use std::sync::Arc;

    struct Idle;

    #[async_trait]
    impl Processor for Idle {
        async fn run(&mut self) -> RunOutcome {
            RunOutcome::success(0)
        }
    }

    fn thawed_task(item: WorkItem) -> Task {
        let message = BrokerMessage {
            id: MessageId(1),
            receipt_handle: ReceiptHandle::new("1"),
            topic: topics::RESTORE_GLACIER.to_string(),
            body: item.id.to_string(),
            receive_count: 1,
            enqueued_at: Utc::now(),
        };
        let result = WorkResult::new(item.id, topics::RESTORE_GLACIER);
        Task::new(item, result, message, Box::new(Idle))
    }

    fn context(registry: Arc<InMemoryRegistry>) -> WorkerContext {
        let restoration = RestorationContext {
            registry,
            object_stores: Arc::new(ObjectStoreRegistry::new()),
            cold_storage: Arc::new(InMemoryColdStorageClient::new()),
            storage_locations: Arc::new(Vec::new()),
            config: RestorationConfig::default(),
        };
        WorkerContext::new(
            Arc::new(InMemoryMessagingService::with_queues(&[
                topics::RESTORE_OBJECT,
                topics::RESTORE_FILE,
            ])),
            Arc::new(InMemoryResultCache::new()),
            restoration,
            ProcessIdentity::new("host-a", 1),
        )
        .with_persistence(PersistenceConfig::immediate())
    }

    fn registry_with_object() -> Arc<InMemoryRegistry> {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.insert_institution(Institution {
            id: 2,
            identifier: "test.edu".to_string(),
            name: String::new(),
            restore_bucket: "restore.test.edu".to_string(),
        });
        registry.insert_object(IntellectualObject {
            id: 8,
            identifier: "test.edu/bag".to_string(),
            institution_id: 2,
            bagit_profile_identifier: String::new(),
            storage_option: "Standard".to_string(),
            file_count: 1,
            size: 1,
        });
        registry
    }

    fn item(action: Action) -> WorkItem {
        let mut item = WorkItem::new(action, Stage::Requested);
        item.id = 31;
        item.object_identifier = "test.edu/bag".to_string();
        item
    }

    #[tokio::test]
    async fn test_restoration_object_targets_institution_bucket() {
        let ctx = context(registry_with_object());
        let mut file_item = item(Action::RestoreFile);
        file_item.generic_file_identifier = "test.edu/bag/data/a.txt".to_string();

        let job = RestorationWorker::File
            .restoration_object(&ctx, &file_item)
            .await
            .unwrap();
        assert_eq!(job.identifier, "test.edu/bag/data/a.txt");
        assert_eq!(job.restoration_type, RestorationType::File);
        assert_eq!(job.restoration_source, RestorationSource::S3);
        assert_eq!(job.restoration_target, "restore.test.edu");

        let job = RestorationWorker::ColdStorage
            .restoration_object(&ctx, &item(Action::GlacierRestore))
            .await
            .unwrap();
        assert_eq!(job.restoration_type, RestorationType::Object);
        assert_eq!(job.restoration_source, RestorationSource::Glacier);
    }

    #[tokio::test]
    async fn test_missing_object_is_fatal() {
        let ctx = context(Arc::new(InMemoryRegistry::new()));
        let err = RestorationWorker::Object
            .build_processor(&ctx, &item(Action::RestoreObject))
            .await
            .err()
            .unwrap();
        assert!(err.is_fatal);
        assert_eq!(err.work_item_id, 31);
        assert!(err.message.contains("IntellectualObject"));
    }

    #[tokio::test]
    async fn test_follow_on_queued_on_hot_tier_topic() {
        let registry = registry_with_object();
        let ctx = context(registry.clone());
        let item = registry.insert_work_item(item(Action::GlacierRestore));
        let mut task = thawed_task(item.clone());

        RestorationWorker::ColdStorage.after_success(&ctx, &mut task).await;

        let follow_on = registry
            .work_items()
            .into_iter()
            .find(|saved| saved.id != item.id)
            .unwrap();
        assert_eq!(follow_on.action, Action::RestoreObject);
        assert!(!task.work_item.needs_admin_review);
    }

    #[tokio::test]
    async fn test_follow_on_save_failure_flags_item() {
        let registry = registry_with_object();
        let ctx = context(registry.clone());
        let mut item = item(Action::GlacierRestore);
        item.note = "Object test.edu/bag restored from Glacier to S3.".to_string();
        let item = registry.insert_work_item(item);
        let mut task = thawed_task(item.clone());

        // One registry attempt per save, so only the follow-on create fails
        registry.fail_next_saves(1);
        RestorationWorker::ColdStorage.after_success(&ctx, &mut task).await;

        assert_eq!(registry.work_items().len(), 1);
        let saved = registry.work_item(item.id).unwrap();
        assert_eq!(
            saved.note,
            format!("Object test.edu/bag restored from Glacier to S3.{FOLLOW_ON_FAILED_NOTE}")
        );
        assert!(saved.needs_admin_review);
        assert!(task.work_item.needs_admin_review);
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(RestorationWorker::ColdStorage.expected_action(), Action::GlacierRestore);
        assert_eq!(RestorationWorker::ColdStorage.restoration_type(), None);
        assert_eq!(RestorationWorker::File.restoration_type(), Some(RestorationType::File));
        assert!(!RestorationWorker::Object.expects_file_identifier());
    }
}
