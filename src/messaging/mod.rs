//! # Messaging
//!
//! Broker abstraction, message decoding and an in-memory broker.

pub mod errors;
pub mod in_memory;
pub mod service;
pub mod types;

pub use errors::{MessagingError, MessagingResult};
pub use in_memory::InMemoryMessagingService;
pub use service::MessagingService;
pub use types::{BrokerMessage, MessageId, QueueStats, ReceiptHandle, WorkMessage};
