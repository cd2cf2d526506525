//! Port for the external message bus client.
//!
//! The failure taxonomy is deliberately small: the broker itself resolves
//! most semantic failures, so the dispatcher only distinguishes errors that
//! should back off quickly (`Transient`) from ones unlikely to heal on
//! their own (`Permanent`). Both remain retryable up to the outbox cap.

use async_trait::async_trait;
use serde_json::Value;

/// Where the broker placed a published record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Bus publish failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventBusError {
    /// Connectivity or timeout; likely to succeed on a later attempt.
    #[error("transient bus failure: {message}")]
    Transient { message: String },
    /// Rejected payload, configuration, or serialisation problem.
    #[error("permanent bus failure: {message}")]
    Permanent { message: String },
}

impl EventBusError {
    /// Build a transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Build a permanent failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }
}

/// Port for publishing one `(topic, key, payload)` record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a record and report where it landed.
    ///
    /// `dedupe_key` carries the outbox idempotency key so brokers that
    /// support it can drop duplicate republishes.
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &Value,
        dedupe_key: &str,
    ) -> Result<PublishReceipt, EventBusError>;
}
