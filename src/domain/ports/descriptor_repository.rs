//! Port for cached type descriptors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::descriptor::TypeDescriptor;

use super::define_port_error;

define_port_error! {
    /// Errors raised by descriptor repository adapters.
    pub enum DescriptorRepositoryError {
        /// Repository connection could not be established or was lost.
        Connection { message: String } => "descriptor repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "descriptor repository query failed: {message}",
    }
}

/// Port for type descriptor rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DescriptorRepository: Send + Sync {
    /// Fetch the descriptor for a type code, valid or not; callers decide
    /// with [`TypeDescriptor::is_valid_for_use`].
    async fn find_by_type(
        &self,
        type_code: &str,
    ) -> Result<Option<TypeDescriptor>, DescriptorRepositoryError>;

    /// Insert or replace a descriptor after a sync from the metadata
    /// authority.
    async fn upsert(&self, descriptor: TypeDescriptor)
        -> Result<(), DescriptorRepositoryError>;

    /// Bump usage statistics after a descriptor informed a validation.
    async fn record_usage(
        &self,
        type_code: &str,
        accessed_at: DateTime<Utc>,
    ) -> Result<(), DescriptorRepositoryError>;

    /// Flag a descriptor as stale so the next consumer refreshes it.
    async fn mark_stale(&self, type_code: &str) -> Result<(), DescriptorRepositoryError>;
}

/// Fixture implementation that knows no descriptors.
///
/// Use it where descriptor-driven validation is not under test; every
/// lookup misses and writes are discarded.
#[derive(Debug, Default)]
pub struct FixtureDescriptorRepository;

#[async_trait]
impl DescriptorRepository for FixtureDescriptorRepository {
    async fn find_by_type(
        &self,
        _type_code: &str,
    ) -> Result<Option<TypeDescriptor>, DescriptorRepositoryError> {
        Ok(None)
    }

    async fn upsert(
        &self,
        _descriptor: TypeDescriptor,
    ) -> Result<(), DescriptorRepositoryError> {
        Ok(())
    }

    async fn record_usage(
        &self,
        _type_code: &str,
        _accessed_at: DateTime<Utc>,
    ) -> Result<(), DescriptorRepositoryError> {
        Ok(())
    }

    async fn mark_stale(&self, _type_code: &str) -> Result<(), DescriptorRepositoryError> {
        Ok(())
    }
}
