//! Tests for the outbox dispatcher workers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mockable::DefaultClock;
use serde_json::json;
use uuid::Uuid;

use super::dispatcher::{
    CircuitBreakerConfig, DispatcherConfig, OutboxDispatcher, BREAKER_OPEN_REASON,
};
use super::outbox::{OutboxEntry, OutboxStatus, DEFAULT_MAX_RETRIES};
use super::ports::{
    EventBusError, MockDispatcherMetrics, MockEventBus, MockOutboxRepository,
    NoOpDispatcherMetrics, PublishReceipt,
};

fn dispatcher(outbox: MockOutboxRepository, bus: MockEventBus) -> OutboxDispatcher {
    dispatcher_with(outbox, bus, DispatcherConfig::default())
}

fn dispatcher_with(
    outbox: MockOutboxRepository,
    bus: MockEventBus,
    config: DispatcherConfig,
) -> OutboxDispatcher {
    OutboxDispatcher::new(
        Arc::new(outbox),
        Arc::new(bus),
        Arc::new(NoOpDispatcherMetrics),
        Arc::new(DefaultClock),
        config,
    )
}

fn pending_entry() -> OutboxEntry {
    OutboxEntry::pending(
        Uuid::new_v4(),
        "KernelObject",
        "object.created",
        json!({"eventId": Uuid::new_v4().to_string()}),
        Utc::now(),
    )
}

#[tokio::test]
async fn pending_entries_publish_with_aggregate_key_and_resolved_topic() {
    let entry = pending_entry();
    let entry_id = entry.id;
    let aggregate_key = entry.aggregate_id.to_string();
    let dedupe = entry.idempotency_key.clone();

    let mut outbox = MockOutboxRepository::new();
    let claimed = entry.clone();
    outbox
        .expect_claim_pending()
        .times(1)
        .returning(move |_, _, _| Ok(vec![claimed.clone()]));
    outbox
        .expect_mark_published()
        .times(1)
        .withf(move |id, topic, partition, offset, _| {
            *id == entry_id
                && topic == "platform.kernel.object.created"
                && *partition == 0
                && *offset == 7
        })
        .returning(|_, _, _, _, _| Ok(()));

    let mut bus = MockEventBus::new();
    bus.expect_publish()
        .times(1)
        .withf(move |topic, key, _, dedupe_key| {
            topic == "platform.kernel.object.created" && key == aggregate_key && dedupe_key == dedupe
        })
        .returning(|topic, _, _, _| {
            Ok(PublishReceipt {
                topic: topic.to_owned(),
                partition: 0,
                offset: 7,
            })
        });

    let report = dispatcher(outbox, bus)
        .drain_pending()
        .await
        .expect("drain succeeds");
    assert_eq!(report.published, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn failures_schedule_exponential_backoff() {
    let entry = pending_entry();
    let entry_id = entry.id;

    let mut outbox = MockOutboxRepository::new();
    let claimed = entry.clone();
    outbox
        .expect_claim_pending()
        .returning(move |_, _, _| Ok(vec![claimed.clone()]));
    outbox
        .expect_mark_failed()
        .times(1)
        .withf(move |id, error, retry_count, next_retry_at| {
            *id == entry_id
                && error.contains("transient")
                && *retry_count == 1
                && next_retry_at.is_some()
        })
        .returning(|_, _, _, _| Ok(()));

    let mut bus = MockEventBus::new();
    bus.expect_publish()
        .returning(|_, _, _, _| Err(EventBusError::transient("broker unreachable")));

    let report = dispatcher(outbox, bus)
        .drain_pending()
        .await
        .expect("drain records the failure");
    assert_eq!(report.failed, 1);
    assert_eq!(report.dead_lettered, 0);
}

#[tokio::test]
async fn final_retry_dead_letters_without_scheduling_another_attempt() {
    let mut entry = pending_entry();
    entry.status = OutboxStatus::Failed;
    entry.retry_count = DEFAULT_MAX_RETRIES - 1;

    let mut outbox = MockOutboxRepository::new();
    let claimed = entry.clone();
    outbox
        .expect_claim_retryable()
        .returning(move |_, _, _| Ok(vec![claimed.clone()]));
    outbox
        .expect_mark_failed()
        .times(1)
        .withf(|_, _, retry_count, next_retry_at| {
            *retry_count == DEFAULT_MAX_RETRIES && next_retry_at.is_none()
        })
        .returning(|_, _, _, _| Ok(()));

    let mut bus = MockEventBus::new();
    bus.expect_publish()
        .returning(|_, _, _, _| Err(EventBusError::permanent("schema rejected")));

    let mut metrics = MockDispatcherMetrics::new();
    metrics.expect_record_failed().times(1).returning(|| Ok(()));
    metrics
        .expect_record_dead_lettered()
        .times(1)
        .returning(|| Ok(()));

    let dispatcher = OutboxDispatcher::new(
        Arc::new(outbox),
        Arc::new(bus),
        Arc::new(metrics),
        Arc::new(DefaultClock),
        DispatcherConfig::default(),
    );
    let report = dispatcher
        .drain_retries()
        .await
        .expect("drain records the dead letter");
    assert_eq!(report.dead_lettered, 1);
}

#[tokio::test]
async fn replaying_a_published_row_is_a_no_op() {
    let mut entry = pending_entry();
    entry.mark_published("platform.kernel.object.created", 0, 3, Utc::now());

    let mut outbox = MockOutboxRepository::new();
    let claimed = entry.clone();
    outbox
        .expect_claim_pending()
        .returning(move |_, _, _| Ok(vec![claimed.clone()]));

    // No bus expectations: publishing again would panic the mock.
    let report = dispatcher(outbox, MockEventBus::new())
        .drain_pending()
        .await
        .expect("drain skips the row");
    assert_eq!(report.skipped, 1);
    assert_eq!(report.published, 0);
}

#[tokio::test]
async fn open_breaker_fails_the_current_row_and_exits_the_batch() {
    let first = pending_entry();
    let second = pending_entry();
    let second_id = second.id;

    let mut outbox = MockOutboxRepository::new();
    let claimed = vec![first, second];
    outbox
        .expect_claim_pending()
        .returning(move |_, _, _| Ok(claimed.clone()));
    outbox
        .expect_mark_failed()
        .times(2)
        .withf(move |id, error, _, _| {
            if *id == second_id {
                error == BREAKER_OPEN_REASON
            } else {
                error.contains("transient")
            }
        })
        .returning(|_, _, _, _| Ok(()));

    let mut bus = MockEventBus::new();
    bus.expect_publish()
        .times(1)
        .returning(|_, _, _, _| Err(EventBusError::transient("broker unreachable")));

    let config = DispatcherConfig {
        breaker: CircuitBreakerConfig {
            failure_threshold: 1,
            open_cooldown: Duration::from_secs(300),
        },
        ..DispatcherConfig::default()
    };
    let report = dispatcher_with(outbox, bus, config)
        .drain_pending()
        .await
        .expect("drain exits early");
    assert!(report.breaker_open);
    assert_eq!(report.failed, 2);
}

#[tokio::test]
async fn unknown_event_types_burn_a_retry_instead_of_spinning() {
    let mut entry = pending_entry();
    entry.event_type = "object.merged".to_owned();

    let mut outbox = MockOutboxRepository::new();
    let claimed = entry.clone();
    outbox
        .expect_claim_pending()
        .returning(move |_, _, _| Ok(vec![claimed.clone()]));
    outbox
        .expect_mark_failed()
        .times(1)
        .withf(|_, error, retry_count, _| error.contains("unknown event type") && *retry_count == 1)
        .returning(|_, _, _, _| Ok(()));

    let report = dispatcher(outbox, MockEventBus::new())
        .drain_pending()
        .await
        .expect("drain records the config fault");
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn sweeper_deletes_aged_published_rows() {
    let mut outbox = MockOutboxRepository::new();
    outbox
        .expect_sweep_published()
        .times(1)
        .withf(|cutoff| *cutoff < Utc::now())
        .returning(|_| Ok(3));

    let mut metrics = MockDispatcherMetrics::new();
    metrics
        .expect_record_swept()
        .times(1)
        .withf(|count| *count == 3)
        .returning(|_| Ok(()));

    let dispatcher = OutboxDispatcher::new(
        Arc::new(outbox),
        Arc::new(MockEventBus::new()),
        Arc::new(metrics),
        Arc::new(DefaultClock),
        DispatcherConfig::default(),
    );
    let swept = dispatcher.sweep().await.expect("sweep succeeds");
    assert_eq!(swept, 3);
}

#[tokio::test]
async fn empty_claims_produce_an_empty_report() {
    let mut outbox = MockOutboxRepository::new();
    outbox
        .expect_claim_pending()
        .returning(|_, _, _| Ok(Vec::new()));

    let report = dispatcher(outbox, MockEventBus::new())
        .drain_pending()
        .await
        .expect("drain succeeds");
    assert_eq!(report, super::dispatcher::DrainReport::default());
}
