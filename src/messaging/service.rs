//! # Messaging Service Trait
//!
//! Broker abstraction used by workers. Delivery is at-least-once: a received
//! message stays invisible for its visibility window and reappears unless it is
//! acknowledged or its window is extended.

use async_trait::async_trait;
use std::time::Duration;

use super::errors::MessagingResult;
use super::types::{BrokerMessage, MessageId, QueueStats, ReceiptHandle};

#[async_trait]
pub trait MessagingService: Send + Sync + 'static {
    /// Create the topic if it does not exist. Idempotent.
    async fn ensure_queue(&self, topic: &str) -> MessagingResult<()>;

    /// Publish a body to a topic
    async fn send_message(&self, topic: &str, body: &str) -> MessagingResult<MessageId>;

    /// Receive up to `max_messages` visible messages, hiding each for
    /// `visibility_timeout`
    async fn receive_messages(
        &self,
        topic: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<BrokerMessage>>;

    /// Acknowledge terminally. The message will not be delivered again.
    async fn ack_message(&self, topic: &str, receipt_handle: &ReceiptHandle) -> MessagingResult<()>;

    /// Return the message to the topic, visible again after `delay`
    async fn requeue_message(
        &self,
        topic: &str,
        receipt_handle: &ReceiptHandle,
        delay: Duration,
    ) -> MessagingResult<()>;

    /// Push the message's visibility deadline out by `extension` from now
    async fn extend_visibility(
        &self,
        topic: &str,
        receipt_handle: &ReceiptHandle,
        extension: Duration,
    ) -> MessagingResult<()>;

    async fn queue_stats(&self, topic: &str) -> MessagingResult<QueueStats>;

    async fn health_check(&self) -> MessagingResult<bool>;

    fn provider_name(&self) -> &'static str;
}
