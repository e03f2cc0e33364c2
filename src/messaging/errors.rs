//! # Messaging Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Message not found: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("Invalid message payload: {payload:?}: {reason}")]
    InvalidPayload { payload: String, reason: String },
}

impl MessagingError {
    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn message_not_found(message_id: impl Into<String>) -> Self {
        Self::MessageNotFound {
            message_id: message_id.into(),
        }
    }

    /// Create an invalid payload error
    pub fn invalid_payload(payload: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            payload: payload.into(),
            reason: reason.into(),
        }
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MessagingError::queue_operation("restore_object", "ack", "gone");
        assert_eq!(
            err.to_string(),
            "Queue operation failed: restore_object: ack: gone"
        );
        assert!(matches!(
            MessagingError::invalid_payload("abc", "not a number"),
            MessagingError::InvalidPayload { .. }
        ));
    }
}
