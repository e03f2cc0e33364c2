//! Per-topic worker settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{topics, Stage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Capacity of the process queue and each outcome queue
    pub channel_buffer_size: usize,
    /// Attempts allowed before a non-fatal error becomes terminal
    pub max_attempts: u32,
    /// Concurrent processors draining the process queue
    pub number_of_workers: usize,
    /// Topic this worker consumes
    pub topic: String,
    /// Topic that receives the id on success. Empty for terminal stages.
    #[serde(default)]
    pub next_topic: String,
    pub next_stage: Stage,
    /// Delay before a requeued message is redelivered
    pub requeue_timeout_secs: u64,
    /// Visibility window requested when receiving messages
    #[serde(default = "default_visibility_secs")]
    pub visibility_timeout_secs: u64,
}

fn default_visibility_secs() -> u64 {
    300
}

impl WorkerSettings {
    pub fn new(topic: impl Into<String>, next_stage: Stage) -> Self {
        Self {
            channel_buffer_size: 20,
            max_attempts: 3,
            number_of_workers: 3,
            topic: topic.into(),
            next_topic: String::new(),
            next_stage,
            requeue_timeout_secs: 60,
            visibility_timeout_secs: default_visibility_secs(),
        }
    }

    pub fn channel(&self) -> String {
        topics::channel_for(&self.topic)
    }

    pub fn next_topic(&self) -> Option<&str> {
        (!self.next_topic.is_empty()).then_some(self.next_topic.as_str())
    }

    pub fn requeue_timeout(&self) -> Duration {
        Duration::from_secs(self.requeue_timeout_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    /// Dedup ring capacity: everything that can be buffered or in flight
    pub fn ring_capacity(&self) -> usize {
        (self.channel_buffer_size * self.number_of_workers).max(1)
    }

    pub fn restore_object() -> Self {
        Self::new(topics::RESTORE_OBJECT, Stage::Resolve)
    }

    pub fn restore_file() -> Self {
        Self::new(topics::RESTORE_FILE, Stage::Resolve)
    }

    pub fn restore_glacier() -> Self {
        Self {
            max_attempts: 10,
            requeue_timeout_secs: 4 * 60 * 60,
            ..Self::new(topics::RESTORE_GLACIER, Stage::Requested)
        }
    }

    pub fn fixity_check() -> Self {
        Self {
            requeue_timeout_secs: 20,
            ..Self::new(topics::FIXITY_CHECK, Stage::Requested)
        }
    }
}
