//! Broker-facing value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::{MessagingError, MessagingResult};

/// Broker-assigned message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle used to ack, requeue or touch a received message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<MessageId> for ReceiptHandle {
    fn from(id: MessageId) -> Self {
        Self(id.to_string())
    }
}

/// One delivery of a message from a topic
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub id: MessageId,
    pub receipt_handle: ReceiptHandle,
    pub topic: String,
    pub body: String,
    /// Deliveries so far, including this one
    pub receive_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Decoded message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkMessage {
    /// Registry work item id
    WorkItemId(i64),
    /// Generic file identifier, carried by fixity-check messages
    FileIdentifier(String),
}

impl WorkMessage {
    /// Parses a body. Topics that carry file identifiers pass
    /// `expects_file_identifier`; everything else must be a positive integer.
    pub fn parse(body: &str, expects_file_identifier: bool) -> MessagingResult<Self> {
        let trimmed = body.trim();
        if expects_file_identifier {
            if trimmed.is_empty() {
                return Err(MessagingError::invalid_payload(body, "empty file identifier"));
            }
            return Ok(Self::FileIdentifier(trimmed.to_string()));
        }
        match trimmed.parse::<i64>() {
            Ok(id) if id > 0 => Ok(Self::WorkItemId(id)),
            Ok(id) => Err(MessagingError::invalid_payload(
                body,
                format!("work item id must be positive, got {id}"),
            )),
            Err(e) => Err(MessagingError::invalid_payload(body, e.to_string())),
        }
    }
}

/// Point-in-time queue counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queue_name: String,
    pub message_count: u64,
    pub in_flight_count: u64,
    pub total_sent: u64,
    pub total_acked: u64,
    pub total_requeued: u64,
}
