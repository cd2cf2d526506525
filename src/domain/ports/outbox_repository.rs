//! Port for outbox drain operations used by the dispatcher.
//!
//! Entries are inserted through the mutation commits; this port claims,
//! resolves, and sweeps them. Claims must be exclusive across dispatcher
//! replicas and must never hand out two rows for the same aggregate at
//! once, preserving per-aggregate publish order.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::outbox::{OutboxEntry, OutboxStatus};

use super::define_port_error;

define_port_error! {
    /// Errors raised by outbox repository adapters.
    pub enum OutboxRepositoryError {
        /// Repository connection could not be established or was lost.
        Connection { message: String } => "outbox repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "outbox repository query failed: {message}",
    }
}

/// Port for outbox drain operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Claim up to `limit` PENDING entries, oldest first, at most one per
    /// aggregate, skipping rows another replica holds. Claimed rows are
    /// leased for `claim_ttl`; a crashed worker's lease simply expires.
    async fn claim_pending(
        &self,
        limit: usize,
        claim_ttl: Duration,
        claimed_by: &str,
    ) -> Result<Vec<OutboxEntry>, OutboxRepositoryError>;

    /// Claim up to `limit` FAILED entries that still have retries left and
    /// whose `next_retry_at` has passed (or is unset), with the same
    /// exclusivity rules as [`Self::claim_pending`].
    async fn claim_retryable(
        &self,
        limit: usize,
        claim_ttl: Duration,
        claimed_by: &str,
    ) -> Result<Vec<OutboxEntry>, OutboxRepositoryError>;

    /// Persist a successful publish: status PUBLISHED, broker coordinates,
    /// `published_at`, lease cleared. Guarded so a row that is already
    /// PUBLISHED is left untouched; the matching journal row is stamped in
    /// the same transaction.
    async fn mark_published(
        &self,
        entry_id: Uuid,
        topic: &str,
        partition: i32,
        offset: i64,
        published_at: DateTime<Utc>,
    ) -> Result<(), OutboxRepositoryError>;

    /// Persist a failed attempt: status FAILED, error text, incremented
    /// retry count, scheduled `next_retry_at` (or none once dead-lettered),
    /// lease cleared. The matching journal row is stamped in the same
    /// transaction.
    async fn mark_failed(
        &self,
        entry_id: Uuid,
        error: &str,
        retry_count: i32,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), OutboxRepositoryError>;

    /// Delete PUBLISHED rows older than `older_than`; returns the number
    /// removed.
    async fn sweep_published(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, OutboxRepositoryError>;

    /// Count rows in one status (operational visibility).
    async fn count_by_status(&self, status: OutboxStatus)
        -> Result<u64, OutboxRepositoryError>;
}
