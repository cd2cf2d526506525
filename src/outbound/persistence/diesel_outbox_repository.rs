//! PostgreSQL-backed `OutboxRepository` implementation using Diesel.
//!
//! Claims run a CTE with `FOR UPDATE SKIP LOCKED` that leases rows to one
//! worker: at most one row per aggregate, oldest first, skipping aggregates
//! that already have a live lease. The claim shape exceeds the DSL, so it
//! is raw SQL behind `diesel::sql_query`; outcome updates use the DSL and
//! stamp the matching journal row in the same transaction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double, Int4, Nullable, Text, Timestamptz, Uuid as SqlUuid};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::outbox::{OutboxEntry, OutboxStatus};
use crate::domain::ports::{OutboxRepository, OutboxRepositoryError};

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::OutboxRow;
use super::pool::{DbPool, PoolError};
use super::schema::meta_outbox_entries;

/// Claim statement for PENDING rows. One row per aggregate (earliest
/// first), no aggregate with a live lease, batch ordered by creation time.
const CLAIM_PENDING_SQL: &str = r#"
WITH candidate AS (
    SELECT id FROM (
        SELECT DISTINCT ON (o.aggregate_id) o.id, o.created_at
        FROM meta_outbox_entries o
        WHERE o.status = 'PENDING'
          AND (o.claimed_until IS NULL OR o.claimed_until < now())
          AND NOT EXISTS (
              SELECT 1 FROM meta_outbox_entries live
              WHERE live.aggregate_id = o.aggregate_id
                AND live.claimed_until >= now()
          )
        ORDER BY o.aggregate_id, o.created_at ASC
    ) d
    ORDER BY d.created_at ASC
    LIMIT $1
),
locked AS (
    SELECT id FROM meta_outbox_entries
    WHERE id IN (SELECT id FROM candidate)
    FOR UPDATE SKIP LOCKED
)
UPDATE meta_outbox_entries e
SET claimed_until = now() + $2 * interval '1 second',
    claimed_by = $3
FROM locked
WHERE e.id = locked.id
RETURNING e.*
"#;

/// Claim statement for FAILED rows whose backoff has elapsed and whose
/// retry budget is not exhausted.
const CLAIM_RETRYABLE_SQL: &str = r#"
WITH candidate AS (
    SELECT id FROM (
        SELECT DISTINCT ON (o.aggregate_id) o.id, o.created_at
        FROM meta_outbox_entries o
        WHERE o.status = 'FAILED'
          AND o.retry_count < o.max_retries
          AND (o.next_retry_at IS NULL OR o.next_retry_at <= now())
          AND (o.claimed_until IS NULL OR o.claimed_until < now())
          AND NOT EXISTS (
              SELECT 1 FROM meta_outbox_entries live
              WHERE live.aggregate_id = o.aggregate_id
                AND live.claimed_until >= now()
          )
        ORDER BY o.aggregate_id, o.created_at ASC
    ) d
    ORDER BY d.created_at ASC
    LIMIT $1
),
locked AS (
    SELECT id FROM meta_outbox_entries
    WHERE id IN (SELECT id FROM candidate)
    FOR UPDATE SKIP LOCKED
)
UPDATE meta_outbox_entries e
SET claimed_until = now() + $2 * interval '1 second',
    claimed_by = $3
FROM locked
WHERE e.id = locked.id
RETURNING e.*
"#;

/// Journal stamp mirroring a publish outcome, linked through the envelope
/// `eventId` carried in the outbox payload.
const STAMP_JOURNAL_PUBLISHED_SQL: &str = r#"
UPDATE meta_object_events
SET status = 'PUBLISHED', topic = $2, partition = $3, "offset" = $4,
    published_at = $5, error = NULL
WHERE id = (
    SELECT (payload ->> 'eventId')::uuid FROM meta_outbox_entries WHERE id = $1
)
"#;

const STAMP_JOURNAL_FAILED_SQL: &str = r#"
UPDATE meta_object_events
SET status = 'FAILED', error = $2
WHERE id = (
    SELECT (payload ->> 'eventId')::uuid FROM meta_outbox_entries WHERE id = $1
)
"#;

/// Diesel-backed implementation of the `OutboxRepository` port.
#[derive(Clone)]
pub struct DieselOutboxRepository {
    pool: DbPool,
}

impl DieselOutboxRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn claim(
        &self,
        statement: &'static str,
        limit: usize,
        claim_ttl: Duration,
        claimed_by: &str,
    ) -> Result<Vec<OutboxEntry>, OutboxRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let rows: Vec<OutboxRow> = diesel::sql_query(statement)
            .bind::<BigInt, _>(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind::<Double, _>(claim_ttl.as_secs_f64())
            .bind::<Text, _>(claimed_by)
            .load(&mut conn)
            .await
            .map_err(map_diesel)?;

        let mut entries = rows
            .into_iter()
            .map(row_to_entry)
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.created_at);
        Ok(entries)
    }
}

fn map_pool(error: PoolError) -> OutboxRepositoryError {
    map_pool_error(error, OutboxRepositoryError::connection)
}

fn map_diesel(error: diesel::result::Error) -> OutboxRepositoryError {
    map_diesel_error(
        error,
        OutboxRepositoryError::query,
        OutboxRepositoryError::connection,
    )
}

/// Convert a database row to the domain outbox entry.
fn row_to_entry(row: OutboxRow) -> Result<OutboxEntry, OutboxRepositoryError> {
    let status = OutboxStatus::parse(&row.status).ok_or_else(|| {
        OutboxRepositoryError::query(format!(
            "corrupted outbox status in database: {}",
            row.status
        ))
    })?;

    Ok(OutboxEntry {
        id: row.id,
        aggregate_id: row.aggregate_id,
        aggregate_type: row.aggregate_type,
        event_type: row.event_type,
        payload: row.payload,
        status,
        retry_count: row.retry_count,
        max_retries: row.max_retries,
        error: row.error,
        published_at: row.published_at,
        topic: row.topic,
        partition: row.partition,
        offset: row.bus_offset,
        next_retry_at: row.next_retry_at,
        idempotency_key: row.idempotency_key,
        created_at: row.created_at,
    })
}

#[async_trait]
impl OutboxRepository for DieselOutboxRepository {
    async fn claim_pending(
        &self,
        limit: usize,
        claim_ttl: Duration,
        claimed_by: &str,
    ) -> Result<Vec<OutboxEntry>, OutboxRepositoryError> {
        self.claim(CLAIM_PENDING_SQL, limit, claim_ttl, claimed_by)
            .await
    }

    async fn claim_retryable(
        &self,
        limit: usize,
        claim_ttl: Duration,
        claimed_by: &str,
    ) -> Result<Vec<OutboxEntry>, OutboxRepositoryError> {
        self.claim(CLAIM_RETRYABLE_SQL, limit, claim_ttl, claimed_by)
            .await
    }

    async fn mark_published(
        &self,
        entry_id: Uuid,
        topic: &str,
        partition: i32,
        offset: i64,
        published_at: DateTime<Utc>,
    ) -> Result<(), OutboxRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let topic = topic.to_owned();
            async move {
                // Guarded: a row that is already PUBLISHED stays untouched,
                // so replaying a published entry is a no-op.
                let updated = diesel::update(
                    meta_outbox_entries::table
                        .filter(meta_outbox_entries::id.eq(entry_id))
                        .filter(meta_outbox_entries::status.eq_any(["PENDING", "FAILED"])),
                )
                .set((
                    meta_outbox_entries::status.eq("PUBLISHED"),
                    meta_outbox_entries::topic.eq(Some(topic.as_str())),
                    meta_outbox_entries::partition.eq(Some(partition)),
                    meta_outbox_entries::bus_offset.eq(Some(offset)),
                    meta_outbox_entries::published_at.eq(Some(published_at)),
                    meta_outbox_entries::next_retry_at.eq(None::<DateTime<Utc>>),
                    meta_outbox_entries::error.eq(None::<String>),
                    meta_outbox_entries::claimed_until.eq(None::<DateTime<Utc>>),
                    meta_outbox_entries::claimed_by.eq(None::<String>),
                ))
                .execute(conn)
                .await?;

                if updated > 0 {
                    diesel::sql_query(STAMP_JOURNAL_PUBLISHED_SQL)
                        .bind::<SqlUuid, _>(entry_id)
                        .bind::<Text, _>(topic.as_str())
                        .bind::<Int4, _>(partition)
                        .bind::<BigInt, _>(offset)
                        .bind::<Timestamptz, _>(published_at)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel)
    }

    async fn mark_failed(
        &self,
        entry_id: Uuid,
        error: &str,
        retry_count: i32,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), OutboxRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let error = error.to_owned();
            async move {
                let updated = diesel::update(
                    meta_outbox_entries::table
                        .filter(meta_outbox_entries::id.eq(entry_id))
                        .filter(meta_outbox_entries::status.eq_any(["PENDING", "FAILED"])),
                )
                .set((
                    meta_outbox_entries::status.eq("FAILED"),
                    meta_outbox_entries::error.eq(Some(error.as_str())),
                    meta_outbox_entries::retry_count.eq(retry_count),
                    meta_outbox_entries::next_retry_at.eq(next_retry_at),
                    meta_outbox_entries::claimed_until.eq(None::<DateTime<Utc>>),
                    meta_outbox_entries::claimed_by.eq(None::<String>),
                ))
                .execute(conn)
                .await?;

                if updated > 0 {
                    diesel::sql_query(STAMP_JOURNAL_FAILED_SQL)
                        .bind::<SqlUuid, _>(entry_id)
                        .bind::<Nullable<Text>, _>(Some(error.as_str()))
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel)
    }

    async fn sweep_published(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, OutboxRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let removed = diesel::delete(
            meta_outbox_entries::table
                .filter(meta_outbox_entries::status.eq("PUBLISHED"))
                .filter(meta_outbox_entries::published_at.le(older_than)),
        )
        .execute(&mut conn)
        .await
        .map_err(map_diesel)?;
        Ok(removed as u64)
    }

    async fn count_by_status(
        &self,
        status: OutboxStatus,
    ) -> Result<u64, OutboxRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let count: i64 = meta_outbox_entries::table
            .filter(meta_outbox_entries::status.eq(status.as_str()))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel)?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn row(status: &str) -> OutboxRow {
        OutboxRow {
            id: Uuid::new_v4(),
            aggregate_id: Uuid::new_v4(),
            aggregate_type: "KernelObject".to_owned(),
            event_type: "object.created".to_owned(),
            payload: json!({}),
            status: status.to_owned(),
            retry_count: 0,
            max_retries: 5,
            error: None,
            published_at: None,
            topic: None,
            partition: None,
            bus_offset: None,
            next_retry_at: None,
            idempotency_key: "KernelObject:aggregate:object.created:0".to_owned(),
            claimed_by: Some("worker-1".to_owned()),
            claimed_until: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }

    #[rstest]
    fn rows_convert_to_domain_entries() {
        let entry = row_to_entry(row("PENDING")).expect("valid row");
        assert_eq!(entry.status, OutboxStatus::Pending);
        assert!(entry.is_dispatchable());
    }

    #[rstest]
    fn corrupted_status_is_a_query_error() {
        let error = row_to_entry(row("SHIPPED")).expect_err("unknown status");
        assert!(error.to_string().contains("SHIPPED"));
    }

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let mapped = map_pool(PoolError::checkout("connection refused"));
        assert!(matches!(mapped, OutboxRepositoryError::Connection { .. }));
    }

    #[rstest]
    fn claim_statements_lease_one_row_per_aggregate() {
        for statement in [CLAIM_PENDING_SQL, CLAIM_RETRYABLE_SQL] {
            assert!(statement.contains("DISTINCT ON (o.aggregate_id)"));
            assert!(statement.contains("FOR UPDATE SKIP LOCKED"));
            assert!(statement.contains("claimed_until"));
        }
        assert!(CLAIM_RETRYABLE_SQL.contains("o.retry_count < o.max_retries"));
    }
}
