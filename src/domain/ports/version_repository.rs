//! Port for reading the append-only version history.
//!
//! Version rows are written exclusively through
//! [`ObjectRepository::commit_mutation`](super::ObjectRepository::commit_mutation);
//! this port only reads them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::context::TenantId;
use crate::domain::event::EventJournalRecord;
use crate::domain::page::{Page, PageRequest};
use crate::domain::version::VersionRecord;

use super::define_port_error;

define_port_error! {
    /// Errors raised by version repository adapters.
    pub enum VersionRepositoryError {
        /// Repository connection could not be established or was lost.
        Connection { message: String } => "version repository connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } => "version repository query failed: {message}",
    }
}

/// Port for version history reads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionRepository: Send + Sync {
    /// Page through an object's history, newest version first.
    async fn history(
        &self,
        tenant: TenantId,
        object_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<VersionRecord>, VersionRepositoryError>;

    /// Fetch one specific version number.
    async fn find_version(
        &self,
        tenant: TenantId,
        object_id: Uuid,
        version_number: i32,
    ) -> Result<Option<VersionRecord>, VersionRepositoryError>;

    /// Time-travel: the version with the largest `created_at` at or before
    /// `at`.
    async fn find_version_at(
        &self,
        tenant: TenantId,
        object_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<VersionRecord>, VersionRepositoryError>;

    /// Number of version rows recorded for the object.
    async fn count_versions(
        &self,
        tenant: TenantId,
        object_id: Uuid,
    ) -> Result<u64, VersionRepositoryError>;

    /// Page through the object's event journal, newest first.
    async fn events_for(
        &self,
        tenant: TenantId,
        object_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<EventJournalRecord>, VersionRepositoryError>;
}
