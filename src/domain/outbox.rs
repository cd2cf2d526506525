//! Transactional outbox rows.
//!
//! An entry is written in the same transaction as the state change it
//! announces and drained to the bus later by the dispatcher. Legal status
//! transitions: PENDING → PUBLISHED, PENDING → FAILED, FAILED → PUBLISHED,
//! FAILED → FAILED (with an incremented retry count). A FAILED row whose
//! retry count has reached `max_retries` is terminal dead-letter state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default cap on publish attempts per entry.
pub const DEFAULT_MAX_RETRIES: i32 = 5;

/// Publish state of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
}

impl OutboxStatus {
    /// Stable string form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Published => "PUBLISHED",
            Self::Failed => "FAILED",
        }
    }

    /// Parse the stored string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "PUBLISHED" => Some(Self::Published),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One outbox row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_type: String,
    pub payload: Value,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub topic: Option<String>,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl OutboxEntry {
    /// Build a pending entry for an aggregate mutation.
    ///
    /// The idempotency key is derived deterministically from the identifying
    /// fields so that re-publishing the same row always presents the same
    /// key to the broker.
    pub fn pending(
        aggregate_id: Uuid,
        aggregate_type: &str,
        event_type: &str,
        payload: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id,
            aggregate_type: aggregate_type.to_owned(),
            event_type: event_type.to_owned(),
            payload,
            status: OutboxStatus::Pending,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            error: None,
            published_at: None,
            topic: None,
            partition: None,
            offset: None,
            next_retry_at: None,
            idempotency_key: idempotency_key(aggregate_type, aggregate_id, event_type, created_at),
            created_at,
        }
    }

    /// Whether the dispatcher may attempt this entry at all.
    ///
    /// Replaying a PUBLISHED row is a no-op; a dead-lettered row is never
    /// re-attempted.
    pub fn is_dispatchable(&self) -> bool {
        match self.status {
            OutboxStatus::Pending => true,
            OutboxStatus::Failed => self.retry_count < self.max_retries,
            OutboxStatus::Published => false,
        }
    }

    /// Whether the entry is terminal dead-letter state.
    pub fn is_dead_lettered(&self) -> bool {
        self.status == OutboxStatus::Failed && self.retry_count >= self.max_retries
    }

    /// Record a successful publish.
    pub fn mark_published(
        &mut self,
        topic: &str,
        partition: i32,
        offset: i64,
        now: DateTime<Utc>,
    ) {
        self.status = OutboxStatus::Published;
        self.published_at = Some(now);
        self.topic = Some(topic.to_owned());
        self.partition = Some(partition);
        self.offset = Some(offset);
        self.next_retry_at = None;
        self.error = None;
    }

    /// Record a failed publish attempt and schedule the next retry.
    ///
    /// The retry count increments first; while attempts remain the next
    /// attempt is `2^retry_count` minutes out (2m, 4m, 8m, 16m, 32m for the
    /// default cap). Once the cap is reached the row stays FAILED with no
    /// scheduled retry.
    pub fn mark_failed(&mut self, error: &str, now: DateTime<Utc>) {
        self.status = OutboxStatus::Failed;
        self.error = Some(error.to_owned());
        self.retry_count += 1;
        self.next_retry_at = if self.retry_count < self.max_retries {
            Some(now + backoff_delay(self.retry_count))
        } else {
            None
        };
    }
}

/// Exponential backoff delay for the given attempt count.
pub fn backoff_delay(retry_count: i32) -> Duration {
    let exponent = u32::try_from(retry_count.clamp(0, 30)).unwrap_or(0);
    Duration::minutes(2_i64.saturating_pow(exponent))
}

/// Deterministic idempotency key: `type:aggregate:event:created_at`.
pub fn idempotency_key(
    aggregate_type: &str,
    aggregate_id: Uuid,
    event_type: &str,
    created_at: DateTime<Utc>,
) -> String {
    format!(
        "{aggregate_type}:{aggregate_id}:{event_type}:{}",
        created_at.timestamp_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn entry() -> OutboxEntry {
        OutboxEntry::pending(
            Uuid::new_v4(),
            "KernelObject",
            "object.created",
            json!({"eventType": "object.created"}),
            Utc::now(),
        )
    }

    #[test]
    fn pending_entries_are_dispatchable() {
        let entry = entry();
        assert_eq!(entry.status, OutboxStatus::Pending);
        assert_eq!(entry.retry_count, 0);
        assert!(entry.is_dispatchable());
        assert!(!entry.is_dead_lettered());
    }

    #[test]
    fn publish_records_broker_coordinates() {
        let mut entry = entry();
        let now = Utc::now();
        entry.mark_published("platform.kernel.object.created", 0, 42, now);

        assert_eq!(entry.status, OutboxStatus::Published);
        assert_eq!(entry.published_at, Some(now));
        assert_eq!(entry.topic.as_deref(), Some("platform.kernel.object.created"));
        assert_eq!(entry.offset, Some(42));
        assert!(!entry.is_dispatchable());
    }

    #[rstest]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(4, 16)]
    #[case(5, 32)]
    fn backoff_doubles_per_attempt(#[case] attempt: i32, #[case] minutes: i64) {
        assert_eq!(backoff_delay(attempt), Duration::minutes(minutes));
    }

    #[test]
    fn failures_schedule_retries_until_the_cap() {
        let mut entry = entry();
        let now = Utc::now();

        for attempt in 1..DEFAULT_MAX_RETRIES {
            entry.mark_failed("broker unreachable", now);
            assert_eq!(entry.retry_count, attempt);
            assert_eq!(entry.next_retry_at, Some(now + backoff_delay(attempt)));
            assert!(entry.is_dispatchable());
        }

        entry.mark_failed("broker unreachable", now);
        assert_eq!(entry.retry_count, DEFAULT_MAX_RETRIES);
        assert_eq!(entry.next_retry_at, None);
        assert!(entry.is_dead_lettered());
        assert!(!entry.is_dispatchable());
    }

    #[test]
    fn failed_entry_can_still_publish() {
        let mut entry = entry();
        let now = Utc::now();
        entry.mark_failed("timeout", now);
        entry.mark_published("platform.kernel.object.created", 0, 7, now);

        assert_eq!(entry.status, OutboxStatus::Published);
        assert_eq!(entry.error, None);
        assert_eq!(entry.next_retry_at, None);
    }

    #[test]
    fn idempotency_key_is_stable_across_replays() {
        let aggregate = Uuid::new_v4();
        let at = Utc::now();
        let first = idempotency_key("KernelObject", aggregate, "object.updated", at);
        let second = idempotency_key("KernelObject", aggregate, "object.updated", at);
        assert_eq!(first, second);
        assert!(first.starts_with("KernelObject:"));
    }
}
