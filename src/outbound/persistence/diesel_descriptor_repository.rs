//! PostgreSQL-backed `DescriptorRepository` implementation using Diesel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::descriptor::TypeDescriptor;
use crate::domain::ports::{DescriptorRepository, DescriptorRepositoryError};

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{DescriptorRow, NewDescriptorRow};
use super::pool::{DbPool, PoolError};
use super::schema::meta_type_descriptors;

/// Diesel-backed implementation of the `DescriptorRepository` port.
#[derive(Clone)]
pub struct DieselDescriptorRepository {
    pool: DbPool,
}

impl DieselDescriptorRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool(error: PoolError) -> DescriptorRepositoryError {
    map_pool_error(error, DescriptorRepositoryError::connection)
}

fn map_diesel(error: diesel::result::Error) -> DescriptorRepositoryError {
    map_diesel_error(
        error,
        DescriptorRepositoryError::query,
        DescriptorRepositoryError::connection,
    )
}

fn row_to_descriptor(row: DescriptorRow) -> TypeDescriptor {
    TypeDescriptor {
        id: row.id,
        type_code: row.type_code,
        type_name: row.type_name,
        descriptor: row.descriptor,
        synced_at: row.synced_at,
        stale: row.stale,
        ttl_minutes: row.ttl_minutes,
        usage_count: row.usage_count,
        last_accessed_at: row.last_accessed_at,
    }
}

#[async_trait]
impl DescriptorRepository for DieselDescriptorRepository {
    async fn find_by_type(
        &self,
        type_code: &str,
    ) -> Result<Option<TypeDescriptor>, DescriptorRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let row: Option<DescriptorRow> = meta_type_descriptors::table
            .filter(meta_type_descriptors::type_code.eq(type_code))
            .select(DescriptorRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel)?;
        Ok(row.map(row_to_descriptor))
    }

    async fn upsert(
        &self,
        descriptor: TypeDescriptor,
    ) -> Result<(), DescriptorRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let row = NewDescriptorRow {
            id: descriptor.id,
            type_code: &descriptor.type_code,
            type_name: &descriptor.type_name,
            descriptor: &descriptor.descriptor,
            synced_at: descriptor.synced_at,
            stale: descriptor.stale,
            ttl_minutes: descriptor.ttl_minutes,
            usage_count: descriptor.usage_count,
            last_accessed_at: descriptor.last_accessed_at,
        };

        diesel::insert_into(meta_type_descriptors::table)
            .values(&row)
            .on_conflict(meta_type_descriptors::type_code)
            .do_update()
            .set((
                meta_type_descriptors::type_name.eq(&descriptor.type_name),
                meta_type_descriptors::descriptor.eq(&descriptor.descriptor),
                meta_type_descriptors::synced_at.eq(descriptor.synced_at),
                meta_type_descriptors::stale.eq(descriptor.stale),
                meta_type_descriptors::ttl_minutes.eq(descriptor.ttl_minutes),
                meta_type_descriptors::modified_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel)
    }

    async fn record_usage(
        &self,
        type_code: &str,
        accessed_at: DateTime<Utc>,
    ) -> Result<(), DescriptorRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        diesel::update(
            meta_type_descriptors::table.filter(meta_type_descriptors::type_code.eq(type_code)),
        )
        .set((
            meta_type_descriptors::usage_count.eq(meta_type_descriptors::usage_count + 1),
            meta_type_descriptors::last_accessed_at.eq(Some(accessed_at)),
        ))
        .execute(&mut conn)
        .await
        .map(|_| ())
        .map_err(map_diesel)
    }

    async fn mark_stale(&self, type_code: &str) -> Result<(), DescriptorRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        diesel::update(
            meta_type_descriptors::table.filter(meta_type_descriptors::type_code.eq(type_code)),
        )
        .set(meta_type_descriptors::stale.eq(true))
        .execute(&mut conn)
        .await
        .map(|_| ())
        .map_err(map_diesel)
    }
}
