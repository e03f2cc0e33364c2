//! # Task
//!
//! One admitted work item travelling through the engine's queues, together
//! with its result record, the broker message it arrived on and the
//! processor that will run it. A task has a single owner at any instant: the
//! queue holding it or the pool worker that drew it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::processor::Processor;
use crate::messaging::{BrokerMessage, MessagingResult, MessagingService};
use crate::models::{RestorationObject, WorkItem, WorkResult};

/// Periodically extends a message's visibility so a long attempt is not
/// redelivered to another consumer. Must be stopped on every exit path;
/// dropping it aborts the ticker as a last resort.
pub struct KeepAlive {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
}

impl std::fmt::Debug for KeepAlive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepAlive")
            .field("running", &self.is_running())
            .field("ticks", &self.ticks())
            .finish()
    }
}

impl KeepAlive {
    pub fn start(
        broker: Arc<dyn MessagingService>,
        message: &BrokerMessage,
        interval: Duration,
        extension: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();
        let topic = message.topic.clone();
        let receipt = message.receipt_handle.clone();
        let message_id = message.id;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    // Fires on an explicit stop and when the sender is dropped
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        match broker.extend_visibility(&topic, &receipt, extension).await {
                            Ok(()) => {
                                counter.fetch_add(1, Ordering::Relaxed);
                                debug!(message_id = %message_id, topic = %topic, "💓 Extended message visibility");
                            }
                            Err(e) => {
                                warn!(message_id = %message_id, topic = %topic, error = %e, "Failed to extend message visibility");
                            }
                        }
                    }
                }
            }
        });

        Self {
            stop: Some(stop_tx),
            handle: Some(handle),
            ticks,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Visibility extensions sent so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Signals the ticker and waits for it to exit
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Keep-alive ticker did not exit cleanly");
            }
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

pub struct Task {
    pub work_item: WorkItem,
    pub work_result: WorkResult,
    pub message: BrokerMessage,
    pub processor: Box<dyn Processor>,
    /// Files the processor reported handling
    pub file_count: usize,
    keep_alive: Option<KeepAlive>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("work_item", &self.work_item.label())
            .field("attempt", &self.work_result.attempt)
            .field("message_id", &self.message.id)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

impl Task {
    pub fn new(
        work_item: WorkItem,
        work_result: WorkResult,
        message: BrokerMessage,
        processor: Box<dyn Processor>,
    ) -> Self {
        Self {
            work_item,
            work_result,
            message,
            processor,
            file_count: 0,
            keep_alive: None,
        }
    }

    pub fn start_keep_alive(
        &mut self,
        broker: Arc<dyn MessagingService>,
        interval: Duration,
        extension: Duration,
    ) {
        self.keep_alive = Some(KeepAlive::start(broker, &self.message, interval, extension));
    }

    pub fn keep_alive_running(&self) -> bool {
        self.keep_alive.as_ref().is_some_and(KeepAlive::is_running)
    }

    pub async fn stop_keep_alive(&mut self) {
        if let Some(mut keep_alive) = self.keep_alive.take() {
            keep_alive.stop().await;
        }
    }

    /// Stops the ticker, then acknowledges the message for good
    pub async fn finish(&mut self, broker: &dyn MessagingService) -> MessagingResult<()> {
        self.stop_keep_alive().await;
        broker
            .ack_message(&self.message.topic, &self.message.receipt_handle)
            .await
    }

    /// Stops the ticker, then asks for redelivery after `delay`
    pub async fn requeue(&mut self, broker: &dyn MessagingService, delay: Duration) -> MessagingResult<()> {
        self.stop_keep_alive().await;
        broker
            .requeue_message(&self.message.topic, &self.message.receipt_handle, delay)
            .await
    }

    pub fn restoration_object(&self) -> Option<&RestorationObject> {
        self.processor.restoration_object()
    }
}
