//! PostgreSQL-backed `ObjectRepository` implementation using Diesel.
//!
//! `commit_mutation` is the heart of the adapter: the object write, the
//! version snapshot, the journal row, the outbox entry, and any edge
//! deactivation run in ONE database transaction. Updates are guarded by
//! `WHERE version = expected_version`; zero affected rows rolls everything
//! back and surfaces a version conflict for the mutator to retry.

use async_trait::async_trait;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::{Bool, Jsonb};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde_json::json;
use uuid::Uuid;

use crate::domain::context::TenantId;
use crate::domain::object::{ObjectStatus, StoredObject};
use crate::domain::page::{Page, PageRequest, MAX_PAGE_SIZE};
use crate::domain::ports::{
    AttributeValue, MutationCommit, ObjectRepository, ObjectRepositoryError, ObjectWrite,
};

use super::error_mapping::{map_diesel_error, map_pool_error, unique_violation_constraint};
use super::models::{
    NewJournalRow, NewObjectRow, NewOutboxRow, NewVersionRow, ObjectChangeset, ObjectRow,
};
use super::pool::{DbPool, PoolError};
use super::schema::{
    meta_kernel_objects, meta_object_events, meta_object_relationships, meta_object_versions,
    meta_outbox_entries,
};

/// Diesel-backed implementation of the `ObjectRepository` port.
#[derive(Clone)]
pub struct DieselObjectRepository {
    pool: DbPool,
}

impl DieselObjectRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Transaction-scoped error distinguishing the guarded-update miss from
/// plain Diesel failures.
enum TxError {
    Diesel(diesel::result::Error),
    VersionConflict(i32),
}

impl From<diesel::result::Error> for TxError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Diesel(error)
    }
}

fn map_pool(error: PoolError) -> ObjectRepositoryError {
    map_pool_error(error, ObjectRepositoryError::connection)
}

fn map_diesel(error: diesel::result::Error) -> ObjectRepositoryError {
    if let Some(constraint) = unique_violation_constraint(&error) {
        // The partial code index is the only uniqueness rule callers can
        // trip; anything else is a schema-level fault.
        if constraint.contains("tenant_type_code") {
            return ObjectRepositoryError::duplicate_code("code occupied by a live row");
        }
        return ObjectRepositoryError::integrity(format!(
            "unexpected unique violation on {constraint}"
        ));
    }
    map_diesel_error(
        error,
        ObjectRepositoryError::query,
        ObjectRepositoryError::connection,
    )
}

fn map_tx_error(error: TxError) -> ObjectRepositoryError {
    match error {
        TxError::Diesel(error) => map_diesel(error),
        TxError::VersionConflict(expected) => ObjectRepositoryError::version_conflict(expected),
    }
}

/// Convert a database row to the domain object.
fn row_to_object(row: ObjectRow) -> Result<StoredObject, ObjectRepositoryError> {
    let status = ObjectStatus::parse(&row.status).ok_or_else(|| {
        ObjectRepositoryError::query(format!("corrupted object status in database: {}", row.status))
    })?;

    Ok(StoredObject {
        id: row.id,
        tenant_id: TenantId::from_uuid(row.tenant_id),
        type_code: row.type_code,
        code: row.code,
        name: row.name,
        data: row.data,
        status,
        version: row.version,
        deleted: row.deleted,
        deleted_at: row.deleted_at,
        deleted_by: row.deleted_by,
        created_at: row.created_at,
        created_by: row.created_by,
        modified_at: row.modified_at,
        modified_by: row.modified_by,
        metadata: row.metadata,
    })
}

#[async_trait]
impl ObjectRepository for DieselObjectRepository {
    async fn commit_mutation(&self, commit: MutationCommit) -> Result<(), ObjectRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        conn.transaction::<_, TxError, _>(|conn| {
            let commit = &commit;
            async move {
                match &commit.write {
                    ObjectWrite::Insert(object) => {
                        diesel::insert_into(meta_kernel_objects::table)
                            .values(NewObjectRow::from_object(object))
                            .execute(conn)
                            .await?;
                    }
                    ObjectWrite::Update {
                        object,
                        expected_version,
                    } => {
                        let updated = diesel::update(
                            meta_kernel_objects::table
                                .filter(meta_kernel_objects::id.eq(object.id))
                                .filter(
                                    meta_kernel_objects::tenant_id.eq(object.tenant_id.as_uuid()),
                                )
                                .filter(meta_kernel_objects::version.eq(expected_version)),
                        )
                        .set(ObjectChangeset::from_object(object))
                        .execute(conn)
                        .await?;

                        if updated == 0 {
                            return Err(TxError::VersionConflict(*expected_version));
                        }
                    }
                }

                diesel::insert_into(meta_object_versions::table)
                    .values(NewVersionRow::from_record(&commit.version))
                    .execute(conn)
                    .await?;

                diesel::insert_into(meta_object_events::table)
                    .values(NewJournalRow::from_record(&commit.journal))
                    .execute(conn)
                    .await?;

                diesel::insert_into(meta_outbox_entries::table)
                    .values(NewOutboxRow::from_entry(&commit.outbox))
                    .execute(conn)
                    .await?;

                if let Some(object_id) = commit.deactivate_edges_of {
                    diesel::update(
                        meta_object_relationships::table.filter(
                            meta_object_relationships::source_id
                                .eq(object_id)
                                .or(meta_object_relationships::target_id.eq(object_id)),
                        ),
                    )
                    .set((
                        meta_object_relationships::active.eq(false),
                        meta_object_relationships::modified_at.eq(commit.journal.created_at),
                    ))
                    .execute(conn)
                    .await?;
                }

                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_tx_error)
    }

    async fn find_by_id(
        &self,
        tenant: TenantId,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<StoredObject>, ObjectRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let mut query = meta_kernel_objects::table
            .filter(meta_kernel_objects::id.eq(id))
            .filter(meta_kernel_objects::tenant_id.eq(tenant.as_uuid()))
            .select(ObjectRow::as_select())
            .into_boxed();
        if !include_deleted {
            query = query.filter(meta_kernel_objects::deleted.eq(false));
        }

        let row: Option<ObjectRow> = query
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel)?;
        row.map(row_to_object).transpose()
    }

    async fn find_by_code(
        &self,
        tenant: TenantId,
        type_code: &str,
        code: &str,
    ) -> Result<Option<StoredObject>, ObjectRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let row: Option<ObjectRow> = meta_kernel_objects::table
            .filter(meta_kernel_objects::tenant_id.eq(tenant.as_uuid()))
            .filter(meta_kernel_objects::type_code.eq(type_code))
            .filter(meta_kernel_objects::code.eq(code))
            .filter(meta_kernel_objects::deleted.eq(false))
            .select(ObjectRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel)?;
        row.map(row_to_object).transpose()
    }

    async fn code_in_use(
        &self,
        tenant: TenantId,
        type_code: &str,
        code: &str,
    ) -> Result<bool, ObjectRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let count: i64 = meta_kernel_objects::table
            .filter(meta_kernel_objects::tenant_id.eq(tenant.as_uuid()))
            .filter(meta_kernel_objects::type_code.eq(type_code))
            .filter(meta_kernel_objects::code.eq(code))
            .filter(meta_kernel_objects::deleted.eq(false))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel)?;
        Ok(count > 0)
    }

    async fn list_by_type(
        &self,
        tenant: TenantId,
        type_code: &str,
        status: Option<ObjectStatus>,
        page: PageRequest,
    ) -> Result<Page<StoredObject>, ObjectRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let mut count_query = meta_kernel_objects::table
            .filter(meta_kernel_objects::tenant_id.eq(tenant.as_uuid()))
            .filter(meta_kernel_objects::type_code.eq(type_code))
            .filter(meta_kernel_objects::deleted.eq(false))
            .count()
            .into_boxed();
        let mut rows_query = meta_kernel_objects::table
            .filter(meta_kernel_objects::tenant_id.eq(tenant.as_uuid()))
            .filter(meta_kernel_objects::type_code.eq(type_code))
            .filter(meta_kernel_objects::deleted.eq(false))
            .select(ObjectRow::as_select())
            .into_boxed();
        if let Some(status) = status {
            count_query = count_query.filter(meta_kernel_objects::status.eq(status.as_str()));
            rows_query = rows_query.filter(meta_kernel_objects::status.eq(status.as_str()));
        }

        let total: i64 = count_query
            .get_result(&mut conn)
            .await
            .map_err(map_diesel)?;
        let rows: Vec<ObjectRow> = rows_query
            .order(meta_kernel_objects::created_at.desc())
            .offset(page.offset())
            .limit(page.limit())
            .load(&mut conn)
            .await
            .map_err(map_diesel)?;

        let items = rows
            .into_iter()
            .map(row_to_object)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total.max(0) as u64, page))
    }

    async fn search_by_name(
        &self,
        tenant: TenantId,
        type_code: &str,
        term: &str,
        page: PageRequest,
    ) -> Result<Page<StoredObject>, ObjectRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;
        let pattern = format!("%{}%", term.replace('%', "\\%").replace('_', "\\_"));

        let total: i64 = meta_kernel_objects::table
            .filter(meta_kernel_objects::tenant_id.eq(tenant.as_uuid()))
            .filter(meta_kernel_objects::type_code.eq(type_code))
            .filter(meta_kernel_objects::deleted.eq(false))
            .filter(meta_kernel_objects::name.ilike(pattern.as_str()))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel)?;
        let rows: Vec<ObjectRow> = meta_kernel_objects::table
            .filter(meta_kernel_objects::tenant_id.eq(tenant.as_uuid()))
            .filter(meta_kernel_objects::type_code.eq(type_code))
            .filter(meta_kernel_objects::deleted.eq(false))
            .filter(meta_kernel_objects::name.ilike(pattern.as_str()))
            .order(meta_kernel_objects::name.asc())
            .offset(page.offset())
            .limit(page.limit())
            .select(ObjectRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel)?;

        let items = rows
            .into_iter()
            .map(row_to_object)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total.max(0) as u64, page))
    }

    async fn find_by_attribute(
        &self,
        tenant: TenantId,
        type_code: &str,
        key: &str,
        value: AttributeValue,
    ) -> Result<Vec<StoredObject>, ObjectRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;
        let needle = json!({ key: value.to_json() });

        let rows: Vec<ObjectRow> = meta_kernel_objects::table
            .filter(meta_kernel_objects::tenant_id.eq(tenant.as_uuid()))
            .filter(meta_kernel_objects::type_code.eq(type_code))
            .filter(meta_kernel_objects::deleted.eq(false))
            .filter(sql::<Bool>("data @> ").bind::<Jsonb, _>(needle))
            .order(meta_kernel_objects::created_at.desc())
            .limit(i64::from(MAX_PAGE_SIZE))
            .select(ObjectRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel)?;

        rows.into_iter().map(row_to_object).collect()
    }

    async fn find_many(
        &self,
        tenant: TenantId,
        ids: &[Uuid],
    ) -> Result<Vec<StoredObject>, ObjectRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let rows: Vec<ObjectRow> = meta_kernel_objects::table
            .filter(meta_kernel_objects::tenant_id.eq(tenant.as_uuid()))
            .filter(meta_kernel_objects::id.eq_any(ids))
            .filter(meta_kernel_objects::deleted.eq(false))
            .select(ObjectRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel)?;

        rows.into_iter().map(row_to_object).collect()
    }

    async fn count_by_type(
        &self,
        tenant: TenantId,
        type_code: &str,
    ) -> Result<u64, ObjectRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let count: i64 = meta_kernel_objects::table
            .filter(meta_kernel_objects::tenant_id.eq(tenant.as_uuid()))
            .filter(meta_kernel_objects::type_code.eq(type_code))
            .filter(meta_kernel_objects::deleted.eq(false))
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

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let mapped = map_pool(PoolError::checkout("connection refused"));
        assert!(matches!(mapped, ObjectRepositoryError::Connection { .. }));
        assert!(mapped.to_string().contains("connection refused"));
    }

    #[rstest]
    fn version_conflict_survives_the_transaction_boundary() {
        let mapped = map_tx_error(TxError::VersionConflict(4));
        assert_eq!(mapped, ObjectRepositoryError::version_conflict(4));
    }

    #[rstest]
    fn not_found_maps_to_query_error() {
        let mapped = map_diesel(diesel::result::Error::NotFound);
        assert!(matches!(mapped, ObjectRepositoryError::Query { .. }));
    }

    #[rstest]
    fn corrupted_status_is_a_query_error() {
        let row = ObjectRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            type_code: "CAND".to_owned(),
            code: "C-1".to_owned(),
            name: "Candidate".to_owned(),
            data: json!({}),
            status: "LIMBO".to_owned(),
            version: 1,
            deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: chrono::Utc::now(),
            created_by: "ada".to_owned(),
            modified_at: chrono::Utc::now(),
            modified_by: "ada".to_owned(),
            metadata: None,
        };
        let error = row_to_object(row).expect_err("unknown status");
        assert!(error.to_string().contains("LIMBO"));
    }
}
