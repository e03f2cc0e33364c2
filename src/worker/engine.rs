//! # Worker Engine
//!
//! Generic intake and routing shared by every stage worker. One engine serves
//! one topic:
//!
//! 1. **Admission.** A broker message is resolved to a work item, run through
//!    the capability's skip rules and the dedup ring, and either acknowledged
//!    as skipped or started and placed on the bounded process queue. Sending
//!    blocks while the queue is full.
//! 2. **Execution.** A fixed pool of workers drains the process queue, runs
//!    each task's processor and routes the task to exactly one of the
//!    success, error or fatal queues.
//! 3. **Completion.** One consumer per outcome queue does the bookkeeping for
//!    that outcome, so writes for one outcome class are never concurrent.
//!
//! On cancellation intake stops and the pipeline drains. Anything still
//! running after the grace period is abandoned to redelivery and its work
//! item released so another worker can pick it up.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::capability::WorkerCapability;
use super::context::WorkerContext;
use super::dedup_ring::DedupRing;
use super::settings::WorkerSettings;
use super::skip::SkipReason;
use super::task::Task;
use crate::constants::Status;
use crate::error::{PreservationError, Result};
use crate::logging::log_work_item_operation;
use crate::messaging::{BrokerMessage, WorkMessage};
use crate::models::{ProcessingError, WorkItem, WorkResult};
use crate::registry::RegistryError;

/// What admission did with one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Started and placed on the process queue
    Enqueued,
    /// Acknowledged without processing
    Skipped(SkipReason),
    /// Could not be resolved or set up; acknowledged as a failure
    Rejected(String),
    /// Handed back to the broker for a later attempt
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Success,
    Error,
    Fatal,
}

impl Route {
    fn as_str(&self) -> &'static str {
        match self {
            Route::Success => "success",
            Route::Error => "error",
            Route::Fatal => "fatal",
        }
    }
}

#[derive(Clone)]
struct OutcomeSenders {
    success: mpsc::Sender<Task>,
    error: mpsc::Sender<Task>,
    fatal: mpsc::Sender<Task>,
}

#[derive(Debug, Default)]
pub struct EngineStats {
    received: AtomicU64,
    skipped: AtomicU64,
    rejected: AtomicU64,
    succeeded: AtomicU64,
    requeued: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatsSnapshot {
    pub received: u64,
    pub skipped: u64,
    pub rejected: u64,
    pub succeeded: u64,
    pub requeued: u64,
    pub failed: u64,
    pub persistence_failures: u64,
}

impl EngineStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct WorkerEngine {
    settings: WorkerSettings,
    ctx: Arc<WorkerContext>,
    capability: Arc<dyn WorkerCapability>,
    ring: DedupRing,
    stats: EngineStats,
    process_tx: Mutex<Option<mpsc::Sender<Task>>>,
    process_rx: Mutex<Option<mpsc::Receiver<Task>>>,
    poll_interval: Duration,
    shutdown_grace: Duration,
    summary_interval: Duration,
}

impl std::fmt::Debug for WorkerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerEngine")
            .field("worker", &self.capability.name())
            .field("settings", &self.settings)
            .field("in_process", &self.ring.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl WorkerEngine {
    pub fn new(
        settings: WorkerSettings,
        ctx: Arc<WorkerContext>,
        capability: Arc<dyn WorkerCapability>,
    ) -> Self {
        let (process_tx, process_rx) = mpsc::channel(settings.channel_buffer_size.max(1));
        Self {
            ring: DedupRing::new(settings.ring_capacity()),
            settings,
            ctx,
            capability,
            stats: EngineStats::default(),
            process_tx: Mutex::new(Some(process_tx)),
            process_rx: Mutex::new(Some(process_rx)),
            poll_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(110),
            summary_interval: Duration::from_secs(300),
        }
    }

    /// How long intake sleeps when the topic is empty
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// How long shutdown waits for in-flight tasks before releasing them
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// How often running totals are logged
    pub fn with_summary_interval(mut self, interval: Duration) -> Self {
        self.summary_interval = interval;
        self
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    pub fn dedup_ring(&self) -> &DedupRing {
        &self.ring
    }

    /// Tasks admitted but not yet drawn by a pool worker
    pub fn queued(&self) -> usize {
        self.process_tx
            .lock()
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        EngineStatsSnapshot {
            received: load(&self.stats.received),
            skipped: load(&self.stats.skipped),
            rejected: load(&self.stats.rejected),
            succeeded: load(&self.stats.succeeded),
            requeued: load(&self.stats.requeued),
            failed: load(&self.stats.failed),
            persistence_failures: self.ctx.persistence_failures(),
        }
    }

    fn topic(&self) -> &str {
        &self.settings.topic
    }

    async fn ack(&self, message: &BrokerMessage) {
        if let Err(e) = self.ctx.broker.ack_message(&message.topic, &message.receipt_handle).await {
            error!(message_id = %message.id, topic = %message.topic, error = %e, "Failed to acknowledge message");
        }
    }

    async fn defer(&self, message: &BrokerMessage, delay: Duration) {
        EngineStats::bump(&self.stats.requeued);
        if let Err(e) = self
            .ctx
            .broker
            .requeue_message(&message.topic, &message.receipt_handle, delay)
            .await
        {
            error!(message_id = %message.id, topic = %message.topic, error = %e, "Failed to requeue message");
        }
    }

    async fn resolve_work_item(&self, message: &BrokerMessage) -> Result<WorkItem> {
        let registry = self.ctx.registry();
        match WorkMessage::parse(&message.body, self.capability.expects_file_identifier())? {
            WorkMessage::WorkItemId(id) => registry
                .work_item_get(id)
                .await?
                .ok_or_else(|| RegistryError::not_found("WorkItem", id.to_string()).into()),
            WorkMessage::FileIdentifier(identifier) => {
                let gf = registry
                    .generic_file_get_by_identifier(&identifier)
                    .await?
                    .ok_or_else(|| RegistryError::not_found("GenericFile", identifier.clone()))?;
                Ok(WorkItem::transient_for_file(gf.id, &identifier))
            }
        }
    }

    /// Result for this attempt. Transient items count attempts by redelivery.
    async fn work_result_for(&self, item: &WorkItem, message: &BrokerMessage) -> WorkResult {
        if item.is_transient() {
            let mut result = WorkResult::new(item.id, self.topic());
            result.attempt = message.receive_count.saturating_sub(1);
            return result;
        }
        match self.ctx.cache.work_result_get(item.id, self.topic()).await {
            Ok(Some(result)) => result,
            Ok(None) => WorkResult::new(item.id, self.topic()),
            Err(e) => {
                warn!(work_item_id = item.id, error = %e, "Could not read work result, starting a new one");
                WorkResult::new(item.id, self.topic())
            }
        }
    }

    /// Admission for one delivered message
    #[instrument(skip(self, message), fields(topic = %self.settings.topic, message_id = %message.id))]
    pub async fn handle_message(&self, message: BrokerMessage) -> AdmissionOutcome {
        EngineStats::bump(&self.stats.received);

        let mut item = match self.resolve_work_item(&message).await {
            Ok(item) => item,
            Err(e) => {
                error!(body = %body_preview(&message.body), error = %e, "❌ Could not resolve work item for message");
                EngineStats::bump(&self.stats.rejected);
                self.ack(&message).await;
                return AdmissionOutcome::Rejected(e.to_string());
            }
        };

        if let Some(reason) = self.capability.should_skip(&mut item, &self.ctx.identity) {
            EngineStats::bump(&self.stats.skipped);
            self.ack(&message).await;
            return AdmissionOutcome::Skipped(reason);
        }

        let key = item.dedup_key();
        if !self.ring.try_add(&key) {
            info!(item = %item.label(), "⏭️ Already processing this item here, skipping");
            EngineStats::bump(&self.stats.skipped);
            self.ack(&message).await;
            return AdmissionOutcome::Skipped(SkipReason::AlreadyInProcess);
        }

        let sender = self.process_tx.lock().clone();
        let Some(sender) = sender else {
            self.ring.remove(&key);
            self.defer(&message, Duration::ZERO).await;
            return AdmissionOutcome::Deferred;
        };

        let mut result = self.work_result_for(&item, &message).await;
        let processor = match self.capability.build_processor(&self.ctx, &item).await {
            Ok(processor) => processor,
            Err(failure) if failure.is_fatal => {
                self.reject_unbuildable(&mut item, &mut result, failure).await;
                self.ring.remove(&key);
                self.ack(&message).await;
                return AdmissionOutcome::Rejected(result.fatal_error_message());
            }
            Err(failure) => {
                warn!(item = %item.label(), error = %failure, "Could not set up task, requeueing");
                self.ring.remove(&key);
                self.defer(&message, self.settings.requeue_timeout()).await;
                return AdmissionOutcome::Deferred;
            }
        };

        result.reset();
        result.start(&self.ctx.identity);
        self.ctx.save_work_result(&result).await;
        let stage = item.stage;
        item.mark_in_progress(
            &self.ctx.identity,
            stage,
            Status::Started,
            format!("Item has started stage {}", self.topic()),
        );
        self.ctx.save_work_item(&mut item).await;

        let mut task = Task::new(item, result, message, processor);
        task.start_keep_alive(
            self.ctx.broker.clone(),
            self.ctx.keep_alive_interval,
            self.settings.visibility_timeout(),
        );
        let work_item_id = task.work_item.id;
        let attempt = task.work_result.attempt;
        if let Err(mpsc::error::SendError(mut task)) = sender.send(task).await {
            warn!(work_item_id = work_item_id, "Process queue closed during admission, requeueing");
            self.ring.remove(&key);
            EngineStats::bump(&self.stats.requeued);
            if let Err(e) = task.requeue(self.ctx.broker.as_ref(), Duration::ZERO).await {
                error!(work_item_id = work_item_id, error = %e, "Failed to requeue message");
            }
            return AdmissionOutcome::Deferred;
        }

        log_work_item_operation(
            "admit",
            work_item_id,
            self.topic(),
            "enqueued",
            Some(&format!("attempt {attempt}")),
        );
        AdmissionOutcome::Enqueued
    }

    async fn reject_unbuildable(&self, item: &mut WorkItem, result: &mut WorkResult, failure: ProcessingError) {
        error!(item = %item.label(), error = %failure, "❌ Could not set up task");
        EngineStats::bump(&self.stats.rejected);
        result.reset();
        result.start(&self.ctx.identity);
        result.add_error(failure);
        item.note = result.fatal_error_message();
        item.retry = false;
        item.needs_admin_review = true;
        self.finish_item(item, result, None).await;
    }

    /// Runs a task's processor and picks its outcome queue
    async fn process_task(&self, mut task: Task) -> (Route, Task) {
        info!(item = %task.work_item.label(), attempt = task.work_result.attempt, "⚙️ Processing");
        let outcome = task.processor.run().await;
        task.file_count = outcome.file_count;
        for failure in outcome.errors {
            task.work_result.add_error(failure);
        }
        if !task.work_item.is_transient() {
            if let Some(job) = task.restoration_object().cloned() {
                self.ctx.save_restoration_object(task.work_item.id, &job).await;
            }
        }

        let route = if task.work_result.has_fatal_errors() {
            Route::Fatal
        } else if task.work_result.has_errors() {
            Route::Error
        } else {
            Route::Success
        };
        debug!(item = %task.work_item.label(), files = task.file_count, route = route.as_str(), "Routed task");
        (route, task)
    }

    /// Shared completion bookkeeping: release the lease, save the item,
    /// close and save the result, then publish to the next topic if any
    async fn finish_item(&self, item: &mut WorkItem, result: &mut WorkResult, next_topic: Option<&str>) {
        item.clear_node_and_pid();
        self.ctx.save_work_item(item).await;
        result.finish();
        self.ctx.save_work_result(result).await;

        let Some(topic) = next_topic else { return };
        if item.is_transient() {
            return;
        }
        match self.ctx.broker.send_message(topic, &item.id.to_string()).await {
            Ok(message_id) => {
                info!(work_item_id = item.id, topic = topic, message_id = %message_id, "📤 Queued for next stage");
            }
            Err(e) => {
                let note = format!("Error adding WorkItem {} to topic {topic}: {e}", item.id);
                error!(work_item_id = item.id, topic = topic, error = %e, "Could not queue for next stage");
                if !item.note.is_empty() {
                    item.note.push(' ');
                }
                item.note.push_str(&note);
                self.ctx.save_work_item(item).await;
            }
        }
    }

    async fn complete_success(&self, task: &mut Task) {
        let key = task.work_item.dedup_key();
        task.work_item.note = self.capability.success_note(task);
        task.work_item.stage = self.settings.next_stage;
        task.work_item.status = Status::Success;
        task.work_item.retry = false;
        task.work_item.needs_admin_review = false;

        let next_topic = self.settings.next_topic().map(str::to_string);
        self.finish_item(&mut task.work_item, &mut task.work_result, next_topic.as_deref())
            .await;
        self.capability.after_success(&self.ctx, task).await;
        if let Err(e) = task.finish(self.ctx.broker.as_ref()).await {
            error!(item = %task.work_item.label(), error = %e, "Failed to acknowledge message");
        }
        self.ring.remove(&key);
        EngineStats::bump(&self.stats.succeeded);
        log_work_item_operation(
            "complete",
            task.work_item.id,
            self.topic(),
            "success",
            Some(&task.work_item.note),
        );
    }

    async fn complete_error(&self, task: &mut Task) {
        let key = task.work_item.dedup_key();
        let attempt = task.work_result.attempt;
        warn!(
            item = %task.work_item.label(),
            attempt = attempt,
            errors = %task.work_result.non_fatal_error_message(),
            "⚠️ Non-fatal errors"
        );
        task.work_item.note = task.work_result.non_fatal_error_message();
        let exhausted = attempt >= self.settings.max_attempts;
        if exhausted {
            task.work_item
                .note
                .push_str(&format!(" Will not retry: failed {attempt} times."));
            task.work_item.retry = false;
            task.work_item.needs_admin_review = true;
        }
        self.finish_item(&mut task.work_item, &mut task.work_result, None).await;
        // Out of the ring before the message can be redelivered
        self.ring.remove(&key);

        let (sent, status) = if exhausted {
            EngineStats::bump(&self.stats.failed);
            (task.finish(self.ctx.broker.as_ref()).await, "gave_up")
        } else {
            EngineStats::bump(&self.stats.requeued);
            (
                task.requeue(self.ctx.broker.as_ref(), self.settings.requeue_timeout())
                    .await,
                "requeued",
            )
        };
        if let Err(e) = sent {
            error!(item = %task.work_item.label(), error = %e, "Failed to release message");
        }
        log_work_item_operation("complete", task.work_item.id, self.topic(), status, Some(&task.work_item.note));
    }

    async fn complete_fatal(&self, task: &mut Task) {
        let key = task.work_item.dedup_key();
        error!(
            item = %task.work_item.label(),
            errors = %task.work_result.fatal_error_message(),
            "❌ Fatal errors"
        );
        task.work_item.note = task.work_result.fatal_error_message();
        task.work_item.retry = false;
        task.work_item.needs_admin_review = true;
        self.finish_item(&mut task.work_item, &mut task.work_result, None).await;
        if let Err(e) = task.finish(self.ctx.broker.as_ref()).await {
            error!(item = %task.work_item.label(), error = %e, "Failed to acknowledge message");
        }
        self.ring.remove(&key);
        EngineStats::bump(&self.stats.failed);
        log_work_item_operation("complete", task.work_item.id, self.topic(), "fatal", Some(&task.work_item.note));
    }

    async fn pool_worker(
        self: Arc<Self>,
        index: usize,
        queue: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>,
        routes: OutcomeSenders,
    ) {
        loop {
            let next = { queue.lock().await.recv().await };
            let Some(task) = next else { break };
            let (route, task) = self.process_task(task).await;
            let sender = match route {
                Route::Success => &routes.success,
                Route::Error => &routes.error,
                Route::Fatal => &routes.fatal,
            };
            if let Err(mpsc::error::SendError(task)) = sender.send(task).await {
                error!(item = %task.work_item.label(), route = route.as_str(), "Outcome queue closed, dropping task");
            }
        }
        debug!(worker = index, "Pool worker exiting");
    }

    async fn consume_outcomes(self: Arc<Self>, route: Route, mut queue: mpsc::Receiver<Task>) {
        while let Some(mut task) = queue.recv().await {
            match route {
                Route::Success => self.complete_success(&mut task).await,
                Route::Error => self.complete_error(&mut task).await,
                Route::Fatal => self.complete_fatal(&mut task).await,
            }
        }
        debug!(route = route.as_str(), "Outcome consumer exiting");
    }

    async fn report_summaries(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.summary_interval.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let stats = self.stats();
                    info!(
                        worker = self.capability.name(),
                        in_process = self.ring.len(),
                        succeeded = stats.succeeded,
                        requeued = stats.requeued,
                        failed = stats.failed,
                        rejected = stats.rejected,
                        persistence_failures = stats.persistence_failures,
                        "📊 Engine summary"
                    );
                    if stats.failed + stats.rejected > 0 {
                        warn!(
                            worker = self.capability.name(),
                            unresolved = stats.failed + stats.rejected,
                            "Items awaiting admin review"
                        );
                    }
                }
            }
        }
    }

    /// Receives messages until cancelled, admitting each in turn
    async fn intake_loop(&self, cancel: &CancellationToken) {
        while !cancel.is_cancelled() {
            let batch = self
                .process_tx
                .lock()
                .as_ref()
                .map(|tx| tx.capacity())
                .unwrap_or(0)
                .max(1);
            match self
                .ctx
                .broker
                .receive_messages(self.topic(), batch, self.settings.visibility_timeout())
                .await
            {
                Ok(messages) if messages.is_empty() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Ok(messages) => {
                    for message in messages {
                        self.handle_message(message).await;
                    }
                }
                Err(e) => {
                    error!(topic = %self.topic(), error = %e, "Failed to receive messages");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }
    }

    /// Returns work items this process still holds to the pool of waiting
    /// work. Their messages are left for the broker to redeliver.
    pub async fn release_in_process_items(&self) -> usize {
        let mut released = 0;
        for key in self.ring.items() {
            self.ring.remove(&key);
            let Ok(id) = key.parse::<i64>() else {
                continue;
            };
            let mut item = match self.ctx.registry().work_item_get(id).await {
                Ok(Some(item)) => item,
                Ok(None) => continue,
                Err(e) => {
                    error!(work_item_id = id, error = %e, "Could not load work item to release it");
                    continue;
                }
            };
            if !item.is_leased_by(&self.ctx.identity) {
                continue;
            }
            let note = format!(
                "Waiting for new worker because container {} was stopped.",
                self.ctx.identity.node
            );
            let stage = item.stage;
            item.mark_no_longer_in_progress(stage, Status::Pending, note);
            if self.ctx.save_work_item(&mut item).await {
                info!(work_item_id = id, "🔓 Released work item on shutdown");
                released += 1;
            }
        }
        released
    }

    /// Runs the engine until `cancel` fires, then drains and shuts down
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<EngineStatsSnapshot> {
        let process_rx = self
            .process_rx
            .lock()
            .take()
            .ok_or_else(|| PreservationError::Worker(format!("{} engine already started", self.capability.name())))?;

        self.ctx.broker.ensure_queue(self.topic()).await?;
        if let Some(next) = self.settings.next_topic() {
            self.ctx.broker.ensure_queue(next).await?;
        }

        info!(
            worker = self.capability.name(),
            topic = %self.topic(),
            channel = %self.settings.channel(),
            workers = self.settings.number_of_workers,
            buffer = self.settings.channel_buffer_size,
            max_attempts = self.settings.max_attempts,
            "🚀 Starting worker engine"
        );

        let buffer = self.settings.channel_buffer_size.max(1);
        let (success_tx, success_rx) = mpsc::channel(buffer);
        let (error_tx, error_rx) = mpsc::channel(buffer);
        let (fatal_tx, fatal_rx) = mpsc::channel(buffer);
        let routes = OutcomeSenders {
            success: success_tx,
            error: error_tx,
            fatal: fatal_tx,
        };

        let queue = Arc::new(tokio::sync::Mutex::new(process_rx));
        let mut handles: Vec<JoinHandle<()>> = (0..self.settings.number_of_workers.max(1))
            .map(|index| tokio::spawn(self.clone().pool_worker(index, queue.clone(), routes.clone())))
            .collect();
        drop(routes);
        for (route, rx) in [
            (Route::Success, success_rx),
            (Route::Error, error_rx),
            (Route::Fatal, fatal_rx),
        ] {
            handles.push(tokio::spawn(self.clone().consume_outcomes(route, rx)));
        }
        handles.push(tokio::spawn(self.clone().report_summaries(cancel.clone())));

        self.intake_loop(&cancel).await;

        info!(worker = self.capability.name(), in_process = self.ring.len(), "🛑 Intake stopped, draining");
        self.process_tx.lock().take();

        let drained = tokio::time::timeout(self.shutdown_grace, join_all(handles.iter_mut())).await;
        match drained {
            Ok(results) => {
                for joined in results {
                    if let Err(e) = joined {
                        error!(error = %e, "Engine task panicked");
                    }
                }
            }
            Err(_) => {
                warn!(
                    worker = self.capability.name(),
                    in_process = self.ring.len(),
                    "Pipeline did not drain within grace period, releasing in-process items"
                );
                for handle in &handles {
                    handle.abort();
                }
            }
        }
        let released = self.release_in_process_items().await;

        let stats = self.stats();
        info!(
            worker = self.capability.name(),
            released = released,
            received = stats.received,
            succeeded = stats.succeeded,
            requeued = stats.requeued,
            failed = stats.failed,
            skipped = stats.skipped,
            rejected = stats.rejected,
            persistence_failures = stats.persistence_failures,
            "✅ Worker engine stopped"
        );
        Ok(stats)
    }
}

const BODY_PREVIEW_CHARS: usize = 200;

/// Trimmed message body, cut to a loggable length
fn body_preview(body: &str) -> &str {
    let body = body.trim();
    match body.char_indices().nth(BODY_PREVIEW_CHARS) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}
