//! # In-Memory Messaging Service
//!
//! Thread-safe in-memory broker with visibility-timeout semantics. Used by tests
//! and single-process deployments.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::errors::{MessagingError, MessagingResult};
use super::service::MessagingService;
use super::types::{BrokerMessage, MessageId, QueueStats, ReceiptHandle};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: u64,
    body: String,
    enqueued_at: DateTime<Utc>,
    /// When the message becomes visible again (None = visible now)
    visible_at: Option<DateTime<Utc>>,
    receive_count: u32,
}

#[derive(Debug, Default)]
struct InMemoryQueue {
    messages: VecDeque<StoredMessage>,
    total_sent: u64,
    total_acked: u64,
    total_requeued: u64,
}

impl InMemoryQueue {
    fn position(&self, handle: &ReceiptHandle) -> MessagingResult<usize> {
        let id: u64 = handle
            .as_str()
            .parse()
            .map_err(|_| MessagingError::message_not_found(handle.as_str()))?;
        self.messages
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| MessagingError::message_not_found(handle.as_str()))
    }
}

#[derive(Debug, Default)]
struct Inner {
    queues: HashMap<String, InMemoryQueue>,
    next_id: u64,
}

/// In-memory broker
///
/// ```rust
/// use preservation_core::messaging::{InMemoryMessagingService, MessagingService};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = InMemoryMessagingService::with_queues(&["restore_object"]);
/// broker.send_message("restore_object", "1234").await?;
/// let messages = broker
///     .receive_messages("restore_object", 10, Duration::from_secs(30))
///     .await?;
/// broker.ack_message("restore_object", &messages[0].receipt_handle).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryMessagingService {
    inner: RwLock<Inner>,
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}

impl InMemoryMessagingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-initialized queues
    pub fn with_queues(topics: &[&str]) -> Self {
        let inner = Inner {
            queues: topics
                .iter()
                .map(|t| (t.to_string(), InMemoryQueue::default()))
                .collect(),
            next_id: 0,
        };
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Messages in a topic, visible or not (for testing)
    pub async fn queue_length(&self, topic: &str) -> usize {
        let inner = self.inner.read().await;
        inner.queues.get(topic).map(|q| q.messages.len()).unwrap_or(0)
    }

    /// Bodies of every message in a topic, oldest first (for testing)
    pub async fn bodies(&self, topic: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .queues
            .get(topic)
            .map(|q| q.messages.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessagingService for InMemoryMessagingService {
    async fn ensure_queue(&self, topic: &str) -> MessagingResult<()> {
        let mut inner = self.inner.write().await;
        inner.queues.entry(topic.to_string()).or_default();
        Ok(())
    }

    async fn send_message(&self, topic: &str, body: &str) -> MessagingResult<MessageId> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        let queue = inner
            .queues
            .get_mut(topic)
            .ok_or_else(|| MessagingError::queue_not_found(topic))?;
        queue.total_sent += 1;
        queue.messages.push_back(StoredMessage {
            id,
            body: body.to_string(),
            enqueued_at: Utc::now(),
            visible_at: None,
            receive_count: 0,
        });
        debug!("📤 Sent message {} to topic {}", id, topic);
        Ok(MessageId(id))
    }

    async fn receive_messages(
        &self,
        topic: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<BrokerMessage>> {
        let mut inner = self.inner.write().await;
        let queue = inner
            .queues
            .get_mut(topic)
            .ok_or_else(|| MessagingError::queue_not_found(topic))?;

        let now = Utc::now();
        let hidden_until = now + chrono_duration(visibility_timeout);
        let mut received = Vec::new();

        for msg in queue.messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }
            if msg.visible_at.map(|at| at <= now).unwrap_or(true) {
                msg.visible_at = Some(hidden_until);
                msg.receive_count += 1;
                received.push(BrokerMessage {
                    id: MessageId(msg.id),
                    receipt_handle: ReceiptHandle::from(MessageId(msg.id)),
                    topic: topic.to_string(),
                    body: msg.body.clone(),
                    receive_count: msg.receive_count,
                    enqueued_at: msg.enqueued_at,
                });
            }
        }

        Ok(received)
    }

    async fn ack_message(&self, topic: &str, receipt_handle: &ReceiptHandle) -> MessagingResult<()> {
        let mut inner = self.inner.write().await;
        let queue = inner
            .queues
            .get_mut(topic)
            .ok_or_else(|| MessagingError::queue_not_found(topic))?;
        let pos = queue.position(receipt_handle)?;
        queue.messages.remove(pos);
        queue.total_acked += 1;
        Ok(())
    }

    async fn requeue_message(
        &self,
        topic: &str,
        receipt_handle: &ReceiptHandle,
        delay: Duration,
    ) -> MessagingResult<()> {
        let mut inner = self.inner.write().await;
        let queue = inner
            .queues
            .get_mut(topic)
            .ok_or_else(|| MessagingError::queue_not_found(topic))?;
        let pos = queue.position(receipt_handle)?;
        queue.messages[pos].visible_at = Some(Utc::now() + chrono_duration(delay));
        queue.total_requeued += 1;
        Ok(())
    }

    async fn extend_visibility(
        &self,
        topic: &str,
        receipt_handle: &ReceiptHandle,
        extension: Duration,
    ) -> MessagingResult<()> {
        let mut inner = self.inner.write().await;
        let queue = inner
            .queues
            .get_mut(topic)
            .ok_or_else(|| MessagingError::queue_not_found(topic))?;
        let pos = queue.position(receipt_handle)?;
        queue.messages[pos].visible_at = Some(Utc::now() + chrono_duration(extension));
        Ok(())
    }

    async fn queue_stats(&self, topic: &str) -> MessagingResult<QueueStats> {
        let inner = self.inner.read().await;
        let queue = inner
            .queues
            .get(topic)
            .ok_or_else(|| MessagingError::queue_not_found(topic))?;
        let now = Utc::now();
        let in_flight_count = queue
            .messages
            .iter()
            .filter(|m| m.visible_at.map(|at| at > now).unwrap_or(false))
            .count() as u64;
        Ok(QueueStats {
            queue_name: topic.to_string(),
            message_count: queue.messages.len() as u64,
            in_flight_count,
            total_sent: queue.total_sent,
            total_acked: queue.total_acked,
            total_requeued: queue.total_requeued,
        })
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
