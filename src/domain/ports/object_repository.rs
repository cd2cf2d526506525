//! Port for live object persistence, including the atomic mutation unit.
//!
//! The mutation pipeline never issues partial writes: it assembles a
//! [`MutationCommit`] (object write + version snapshot + journal row +
//! outbox entry) and hands it to the adapter, which commits everything in
//! one database transaction or nothing at all.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::context::TenantId;
use crate::domain::event::EventJournalRecord;
use crate::domain::object::{ObjectStatus, StoredObject};
use crate::domain::outbox::OutboxEntry;
use crate::domain::page::{Page, PageRequest};
use crate::domain::version::VersionRecord;

use super::define_port_error;

define_port_error! {
    /// Errors raised by object repository adapters.
    pub enum ObjectRepositoryError {
        /// Repository connection could not be established or was lost.
        Connection { message: String } => "object repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "object repository query failed: {message}",
        /// Another non-deleted object already holds this code.
        DuplicateCode { code: String } => "object code already in use: {code}",
        /// A concurrent writer committed first; the guarded update matched
        /// zero rows.
        VersionConflict { expected: i32 } => "object changed concurrently (expected version {expected})",
        /// A constraint other than code uniqueness was violated.
        Integrity { message: String } => "object repository integrity violation: {message}",
    }
}

/// The object half of a mutation commit.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectWrite {
    /// Insert a brand-new row (create protocol).
    Insert(StoredObject),
    /// Replace the row, guarded by `WHERE version = expected_version` so
    /// concurrent writers can never mint duplicate version numbers.
    Update {
        object: StoredObject,
        expected_version: i32,
    },
}

impl ObjectWrite {
    /// The post-mutation object image.
    pub fn object(&self) -> &StoredObject {
        match self {
            Self::Insert(object) | Self::Update { object, .. } => object,
        }
    }
}

/// Everything one mutation commits atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationCommit {
    pub write: ObjectWrite,
    pub version: VersionRecord,
    pub journal: EventJournalRecord,
    pub outbox: OutboxEntry,
    /// When set (soft delete), edges touching this object are deactivated
    /// in the same transaction.
    pub deactivate_edges_of: Option<Uuid>,
}

/// Typed top-level attribute value for JSON containment queries.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl AttributeValue {
    /// The JSON value matched by containment.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Number(number) => serde_json::Number::from_f64(*number)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Bool(flag) => Value::Bool(*flag),
        }
    }
}

/// Port for object row storage.
///
/// Every query is tenant-scoped; rows with `deleted = true` are invisible
/// unless the operation says otherwise.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectRepository: Send + Sync {
    /// Commit a full mutation atomically. See [`MutationCommit`].
    async fn commit_mutation(&self, commit: MutationCommit) -> Result<(), ObjectRepositoryError>;

    /// Fetch one live row by id. `include_deleted` admits soft-deleted rows
    /// (restore protocol).
    async fn find_by_id(
        &self,
        tenant: TenantId,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<StoredObject>, ObjectRepositoryError>;

    /// Fetch one live row by its human-readable code.
    async fn find_by_code(
        &self,
        tenant: TenantId,
        type_code: &str,
        code: &str,
    ) -> Result<Option<StoredObject>, ObjectRepositoryError>;

    /// Whether a non-deleted row already occupies `(tenant, type, code)`.
    async fn code_in_use(
        &self,
        tenant: TenantId,
        type_code: &str,
        code: &str,
    ) -> Result<bool, ObjectRepositoryError>;

    /// Page through live rows of one type, optionally filtered by status.
    async fn list_by_type(
        &self,
        tenant: TenantId,
        type_code: &str,
        status: Option<ObjectStatus>,
        page: PageRequest,
    ) -> Result<Page<StoredObject>, ObjectRepositoryError>;

    /// Page through live rows whose name contains `term`
    /// (case-insensitive).
    async fn search_by_name(
        &self,
        tenant: TenantId,
        type_code: &str,
        term: &str,
        page: PageRequest,
    ) -> Result<Page<StoredObject>, ObjectRepositoryError>;

    /// Live rows whose data document contains `{key: value}` at the top
    /// level.
    async fn find_by_attribute(
        &self,
        tenant: TenantId,
        type_code: &str,
        key: &str,
        value: AttributeValue,
    ) -> Result<Vec<StoredObject>, ObjectRepositoryError>;

    /// Fetch many live rows at once; unknown ids are silently absent.
    async fn find_many(
        &self,
        tenant: TenantId,
        ids: &[Uuid],
    ) -> Result<Vec<StoredObject>, ObjectRepositoryError>;

    /// Count live rows of one type.
    async fn count_by_type(
        &self,
        tenant: TenantId,
        type_code: &str,
    ) -> Result<u64, ObjectRepositoryError>;
}
