//! Outbox dispatcher: drains committed events to the message bus.
//!
//! Three cooperative loops share one dispatcher value: the pending worker,
//! the retry worker, and the cleanup sweeper. All are safe to run
//! concurrently across process replicas because every row is claimed
//! exclusively (with a lease) before publishing, at most one in-flight row
//! per aggregate. Bus failures never propagate anywhere: they are recorded
//! on the row and retried with exponential backoff until the retry cap
//! dead-letters it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockable::Clock;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::error::Error;
use super::event::topic_for;
use super::outbox::OutboxEntry;
use super::ports::{
    DispatcherMetrics, EventBus, EventBusError, OutboxRepository, OutboxRepositoryError,
};

mod policy;

pub use policy::{BreakerState, CircuitBreakerConfig};

/// Failure reason recorded when the circuit breaker refuses a publish.
pub const BREAKER_OPEN_REASON: &str = "breaker_open";

/// Dispatcher tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Cadence of the pending and retry workers.
    pub poll_interval: Duration,
    /// Maximum rows taken per drain cycle.
    pub batch_size: usize,
    /// Lease length on claimed rows; expired leases free the row for other
    /// replicas.
    pub claim_ttl: Duration,
    /// Age beyond which PUBLISHED rows are swept.
    pub retention: Duration,
    /// Cadence of the cleanup sweeper.
    pub sweep_interval: Duration,
    /// Circuit breaker thresholds for the bus.
    pub breaker: CircuitBreakerConfig,
    /// Identity written into row claims (diagnostics).
    pub worker_id: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 100,
            claim_ttl: Duration::from_secs(60),
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
            breaker: CircuitBreakerConfig::default(),
            worker_id: "outbox-dispatcher".to_owned(),
        }
    }
}

/// What one drain cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub published: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    pub skipped: usize,
    /// The cycle stopped early because the breaker was open.
    pub breaker_open: bool,
}

/// The outbox drain service.
pub struct OutboxDispatcher {
    outbox: Arc<dyn OutboxRepository>,
    bus: Arc<dyn EventBus>,
    metrics: Arc<dyn DispatcherMetrics>,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
    breaker: Mutex<BreakerState>,
}

impl OutboxDispatcher {
    /// Wire the dispatcher from its ports.
    pub fn new(
        outbox: Arc<dyn OutboxRepository>,
        bus: Arc<dyn EventBus>,
        metrics: Arc<dyn DispatcherMetrics>,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> Self {
        let breaker = Mutex::new(BreakerState::new(config.breaker));
        Self {
            outbox,
            bus,
            metrics,
            clock,
            config,
            breaker,
        }
    }

    /// One pending-worker cycle: claim PENDING rows and publish them.
    pub async fn drain_pending(&self) -> Result<DrainReport, Error> {
        let entries = self
            .outbox
            .claim_pending(
                self.config.batch_size,
                self.config.claim_ttl,
                &self.config.worker_id,
            )
            .await
            .map_err(map_outbox_error)?;
        self.dispatch_batch(entries).await
    }

    /// One retry-worker cycle: claim FAILED rows whose backoff has elapsed
    /// and publish them.
    pub async fn drain_retries(&self) -> Result<DrainReport, Error> {
        let entries = self
            .outbox
            .claim_retryable(
                self.config.batch_size,
                self.config.claim_ttl,
                &self.config.worker_id,
            )
            .await
            .map_err(map_outbox_error)?;
        self.dispatch_batch(entries).await
    }

    /// One sweeper cycle: delete PUBLISHED rows older than the retention
    /// window. Returns the number removed.
    pub async fn sweep(&self) -> Result<u64, Error> {
        let cutoff = self.clock.utc()
            - chrono::Duration::from_std(self.config.retention)
                .map_err(|err| Error::integrity(format!("invalid retention window: {err}")))?;
        let swept = self
            .outbox
            .sweep_published(cutoff)
            .await
            .map_err(map_outbox_error)?;
        if swept > 0 {
            info!(swept, %cutoff, "swept published outbox entries");
            let _ = self.metrics.record_swept(swept).await;
        }
        Ok(swept)
    }

    /// Run the pending worker until `shutdown` flips to `true`.
    pub async fn run_pending_worker(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.drain_pending().await {
                        error!(error = %err, "pending drain cycle failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("pending worker stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Run the retry worker until `shutdown` flips to `true`.
    pub async fn run_retry_worker(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.drain_retries().await {
                        error!(error = %err, "retry drain cycle failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("retry worker stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Run the cleanup sweeper until `shutdown` flips to `true`.
    pub async fn run_sweeper(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        error!(error = %err, "sweep cycle failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("sweeper stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn dispatch_batch(&self, entries: Vec<OutboxEntry>) -> Result<DrainReport, Error> {
        let mut report = DrainReport::default();
        if entries.is_empty() {
            return Ok(report);
        }
        debug!(count = entries.len(), "dispatching claimed outbox entries");

        for entry in entries {
            match self.dispatch_entry(&entry).await? {
                EntryOutcome::Published => report.published += 1,
                EntryOutcome::Failed => report.failed += 1,
                EntryOutcome::DeadLettered => {
                    report.failed += 1;
                    report.dead_lettered += 1;
                }
                EntryOutcome::Skipped => report.skipped += 1,
                EntryOutcome::BreakerOpen => {
                    report.failed += 1;
                    report.breaker_open = true;
                    warn!("circuit breaker open, abandoning drain cycle");
                    break;
                }
            }
        }
        Ok(report)
    }

    async fn dispatch_entry(&self, entry: &OutboxEntry) -> Result<EntryOutcome, Error> {
        // Replaying an already-published or dead-lettered row is a no-op;
        // the claim predicates exclude them, this guards direct calls.
        if !entry.is_dispatchable() {
            return Ok(EntryOutcome::Skipped);
        }

        let now = self.clock.utc();
        if !self.admit(now) {
            self.record_failure_on_row(entry, BREAKER_OPEN_REASON, now)
                .await?;
            return Ok(EntryOutcome::BreakerOpen);
        }

        let Some(topic) = topic_for(&entry.event_type) else {
            // No destination is a configuration fault; burn a retry so the
            // row eventually dead-letters instead of spinning forever.
            warn!(entry_id = %entry.id, event_type = %entry.event_type, "no topic for event type");
            self.record_bus_failure(entry, "unknown event type", now)
                .await?;
            return Ok(self.failed_outcome(entry));
        };

        let key = entry.aggregate_id.to_string();
        match self
            .bus
            .publish(&topic, &key, &entry.payload, &entry.idempotency_key)
            .await
        {
            Ok(receipt) => {
                self.breaker_success();
                self.outbox
                    .mark_published(
                        entry.id,
                        &receipt.topic,
                        receipt.partition,
                        receipt.offset,
                        now,
                    )
                    .await
                    .map_err(map_outbox_error)?;
                let _ = self.metrics.record_published().await;
                debug!(
                    entry_id = %entry.id,
                    topic = %receipt.topic,
                    offset = receipt.offset,
                    "outbox entry published"
                );
                Ok(EntryOutcome::Published)
            }
            Err(err) => {
                let reason = match &err {
                    EventBusError::Transient { message } => format!("transient: {message}"),
                    EventBusError::Permanent { message } => format!("permanent: {message}"),
                };
                warn!(entry_id = %entry.id, error = %reason, "outbox publish failed");
                self.record_bus_failure(entry, &reason, now).await?;
                Ok(self.failed_outcome(entry))
            }
        }
    }

    /// Persist a failure that also counts against the breaker.
    async fn record_bus_failure(
        &self,
        entry: &OutboxEntry,
        reason: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), Error> {
        self.breaker_failure(now);
        self.record_failure_on_row(entry, reason, now).await
    }

    /// Persist a failure outcome on the row and emit metrics.
    async fn record_failure_on_row(
        &self,
        entry: &OutboxEntry,
        reason: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), Error> {
        let mut failed = entry.clone();
        failed.mark_failed(reason, now);
        self.outbox
            .mark_failed(entry.id, reason, failed.retry_count, failed.next_retry_at)
            .await
            .map_err(map_outbox_error)?;
        let _ = self.metrics.record_failed().await;
        if failed.is_dead_lettered() {
            warn!(entry_id = %entry.id, retries = failed.retry_count, "outbox entry dead-lettered");
            let _ = self.metrics.record_dead_lettered().await;
        }
        Ok(())
    }

    fn failed_outcome(&self, entry: &OutboxEntry) -> EntryOutcome {
        // retry_count on the claimed snapshot is pre-failure.
        if entry.retry_count + 1 >= entry.max_retries {
            EntryOutcome::DeadLettered
        } else {
            EntryOutcome::Failed
        }
    }

    fn admit(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.breaker
            .lock()
            .map(|mut state| state.admit(now))
            .unwrap_or(false)
    }

    fn breaker_success(&self) {
        if let Ok(mut state) = self.breaker.lock() {
            state.record_success();
        }
    }

    fn breaker_failure(&self, now: chrono::DateTime<chrono::Utc>) {
        if let Ok(mut state) = self.breaker.lock() {
            state.record_failure(now);
        }
    }
}

enum EntryOutcome {
    Published,
    Failed,
    DeadLettered,
    Skipped,
    BreakerOpen,
}

fn map_outbox_error(error: OutboxRepositoryError) -> Error {
    match error {
        OutboxRepositoryError::Connection { message } => {
            Error::unavailable(format!("outbox unavailable: {message}"))
        }
        OutboxRepositoryError::Query { message } => {
            Error::integrity(format!("outbox error: {message}"))
        }
    }
}
