//! PostgreSQL-backed `VersionRepository` implementation using Diesel.
//!
//! Read-only: version and journal rows are only ever written inside
//! `DieselObjectRepository::commit_mutation`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::context::TenantId;
use crate::domain::event::{EventJournalRecord, JournalStatus};
use crate::domain::page::{Page, PageRequest};
use crate::domain::ports::{VersionRepository, VersionRepositoryError};
use crate::domain::version::{ChangeType, VersionRecord};

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{JournalRow, VersionRow};
use super::pool::{DbPool, PoolError};
use super::schema::{meta_object_events, meta_object_versions};

/// Diesel-backed implementation of the `VersionRepository` port.
#[derive(Clone)]
pub struct DieselVersionRepository {
    pool: DbPool,
}

impl DieselVersionRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool(error: PoolError) -> VersionRepositoryError {
    map_pool_error(error, VersionRepositoryError::connection)
}

fn map_diesel(error: diesel::result::Error) -> VersionRepositoryError {
    map_diesel_error(
        error,
        VersionRepositoryError::query,
        VersionRepositoryError::connection,
    )
}

/// Convert a database row to the domain version record.
fn row_to_record(row: VersionRow) -> Result<VersionRecord, VersionRepositoryError> {
    let change_type = ChangeType::parse(&row.change_type).ok_or_else(|| {
        VersionRepositoryError::query(format!(
            "corrupted change type in database: {}",
            row.change_type
        ))
    })?;

    Ok(VersionRecord {
        id: row.id,
        object_id: row.object_id,
        tenant_id: TenantId::from_uuid(row.tenant_id),
        type_code: row.type_code,
        code: row.code,
        name: row.name,
        status: row.status,
        version_number: row.version_number,
        change_type,
        previous_data: row.previous_data,
        current_data: row.current_data,
        diff: row.diff,
        changed_by: row.changed_by,
        ip: row.ip,
        user_agent: row.user_agent,
        change_reason: row.change_reason,
        created_at: row.created_at,
    })
}

/// Convert a database row to the domain journal record.
fn row_to_journal(row: JournalRow) -> Result<EventJournalRecord, VersionRepositoryError> {
    let status = JournalStatus::parse(&row.status).ok_or_else(|| {
        VersionRepositoryError::query(format!(
            "corrupted journal status in database: {}",
            row.status
        ))
    })?;

    Ok(EventJournalRecord {
        id: row.id,
        object_id: row.object_id,
        tenant_id: TenantId::from_uuid(row.tenant_id),
        event_type: row.event_type,
        payload: row.payload,
        status,
        topic: row.topic,
        partition: row.partition,
        offset: row.bus_offset,
        error: row.error,
        published_at: row.published_at,
        created_at: row.created_at,
    })
}

#[async_trait]
impl VersionRepository for DieselVersionRepository {
    async fn history(
        &self,
        tenant: TenantId,
        object_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<VersionRecord>, VersionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let total: i64 = meta_object_versions::table
            .filter(meta_object_versions::object_id.eq(object_id))
            .filter(meta_object_versions::tenant_id.eq(tenant.as_uuid()))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel)?;
        let rows: Vec<VersionRow> = meta_object_versions::table
            .filter(meta_object_versions::object_id.eq(object_id))
            .filter(meta_object_versions::tenant_id.eq(tenant.as_uuid()))
            .order(meta_object_versions::version_number.desc())
            .offset(page.offset())
            .limit(page.limit())
            .select(VersionRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel)?;

        let items = rows
            .into_iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total.max(0) as u64, page))
    }

    async fn find_version(
        &self,
        tenant: TenantId,
        object_id: Uuid,
        version_number: i32,
    ) -> Result<Option<VersionRecord>, VersionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let row: Option<VersionRow> = meta_object_versions::table
            .filter(meta_object_versions::object_id.eq(object_id))
            .filter(meta_object_versions::tenant_id.eq(tenant.as_uuid()))
            .filter(meta_object_versions::version_number.eq(version_number))
            .select(VersionRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel)?;
        row.map(row_to_record).transpose()
    }

    async fn find_version_at(
        &self,
        tenant: TenantId,
        object_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<VersionRecord>, VersionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let row: Option<VersionRow> = meta_object_versions::table
            .filter(meta_object_versions::object_id.eq(object_id))
            .filter(meta_object_versions::tenant_id.eq(tenant.as_uuid()))
            .filter(meta_object_versions::created_at.le(at))
            .order(meta_object_versions::created_at.desc())
            .select(VersionRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel)?;
        row.map(row_to_record).transpose()
    }

    async fn count_versions(
        &self,
        tenant: TenantId,
        object_id: Uuid,
    ) -> Result<u64, VersionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let count: i64 = meta_object_versions::table
            .filter(meta_object_versions::object_id.eq(object_id))
            .filter(meta_object_versions::tenant_id.eq(tenant.as_uuid()))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel)?;
        Ok(count.max(0) as u64)
    }

    async fn events_for(
        &self,
        tenant: TenantId,
        object_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<EventJournalRecord>, VersionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let total: i64 = meta_object_events::table
            .filter(meta_object_events::object_id.eq(object_id))
            .filter(meta_object_events::tenant_id.eq(tenant.as_uuid()))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel)?;
        let rows: Vec<JournalRow> = meta_object_events::table
            .filter(meta_object_events::object_id.eq(object_id))
            .filter(meta_object_events::tenant_id.eq(tenant.as_uuid()))
            .order(meta_object_events::created_at.desc())
            .offset(page.offset())
            .limit(page.limit())
            .select(JournalRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel)?;

        let items = rows
            .into_iter()
            .map(row_to_journal)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total.max(0) as u64, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let mapped = map_pool(PoolError::checkout("connection refused"));
        assert!(matches!(mapped, VersionRepositoryError::Connection { .. }));
    }

    #[rstest]
    fn corrupted_change_type_is_a_query_error() {
        let row = VersionRow {
            id: Uuid::new_v4(),
            object_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            type_code: "CAND".to_owned(),
            code: "C-1".to_owned(),
            name: "Candidate".to_owned(),
            status: "ACTIVE".to_owned(),
            version_number: 1,
            change_type: "MERGE".to_owned(),
            previous_data: None,
            current_data: None,
            diff: None,
            changed_by: "ada".to_owned(),
            ip: None,
            user_agent: None,
            change_reason: None,
            created_at: Utc::now(),
        };
        let error = row_to_record(row).expect_err("unknown change type");
        assert!(error.to_string().contains("MERGE"));
    }
}
