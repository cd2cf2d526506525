//! Port for relationship persistence.
//!
//! Edge mutations follow the same atomic shape as object mutations: the
//! edge write, its journal row, and its outbox entry commit together.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::event::EventJournalRecord;
use crate::domain::outbox::OutboxEntry;
use crate::domain::relationship::ObjectRelationship;

use super::define_port_error;

define_port_error! {
    /// Errors raised by relationship repository adapters.
    pub enum RelationshipRepositoryError {
        /// Repository connection could not be established or was lost.
        Connection { message: String } => "relationship repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "relationship repository query failed: {message}",
        /// An edge with this `(source, target, type)` triple already exists.
        DuplicateEdge => "relationship already exists",
        /// One of the endpoints does not exist (foreign key violation).
        MissingEndpoint { message: String } => "relationship endpoint missing: {message}",
    }
}

/// Port for edge storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelationshipRepository: Send + Sync {
    /// Insert the edge, its journal row, and its outbox entry atomically.
    async fn commit_link(
        &self,
        relationship: ObjectRelationship,
        journal: EventJournalRecord,
        outbox: OutboxEntry,
    ) -> Result<(), RelationshipRepositoryError>;

    /// Delete the edge and record the removal (journal + outbox)
    /// atomically. Returns `false` when no such edge existed.
    async fn commit_unlink(
        &self,
        relationship_id: Uuid,
        journal: EventJournalRecord,
        outbox: OutboxEntry,
    ) -> Result<bool, RelationshipRepositoryError>;

    /// Fetch one edge by the unique `(source, target, type)` triple.
    async fn find_edge(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        rel_type: &str,
    ) -> Result<Option<ObjectRelationship>, RelationshipRepositoryError>;

    /// Active edges leaving `source_id`, ordered by `display_order` then
    /// creation time.
    async fn edges_from(
        &self,
        source_id: Uuid,
    ) -> Result<Vec<ObjectRelationship>, RelationshipRepositoryError>;

    /// Active edges arriving at `target_id`.
    async fn edges_to(
        &self,
        target_id: Uuid,
    ) -> Result<Vec<ObjectRelationship>, RelationshipRepositoryError>;
}
