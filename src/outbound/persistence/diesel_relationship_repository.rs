//! PostgreSQL-backed `RelationshipRepository` implementation using Diesel.
//!
//! Edge mutations mirror the object commit shape: the edge write, its
//! journal row, and its outbox entry run in one transaction.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::context::TenantId;
use crate::domain::event::EventJournalRecord;
use crate::domain::outbox::OutboxEntry;
use crate::domain::ports::{RelationshipRepository, RelationshipRepositoryError};
use crate::domain::relationship::{Cardinality, ObjectRelationship};

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{NewJournalRow, NewOutboxRow, NewRelationshipRow, RelationshipRow};
use super::pool::{DbPool, PoolError};
use super::schema::{meta_object_events, meta_object_relationships, meta_outbox_entries};

/// Diesel-backed implementation of the `RelationshipRepository` port.
#[derive(Clone)]
pub struct DieselRelationshipRepository {
    pool: DbPool,
}

impl DieselRelationshipRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool(error: PoolError) -> RelationshipRepositoryError {
    map_pool_error(error, RelationshipRepositoryError::connection)
}

fn map_diesel(error: diesel::result::Error) -> RelationshipRepositoryError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            return RelationshipRepositoryError::duplicate_edge();
        }
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
            return RelationshipRepositoryError::missing_endpoint(info.message().to_owned());
        }
        _ => {}
    }
    map_diesel_error(
        error,
        RelationshipRepositoryError::query,
        RelationshipRepositoryError::connection,
    )
}

/// Convert a database row to the domain relationship.
fn row_to_relationship(
    row: RelationshipRow,
) -> Result<ObjectRelationship, RelationshipRepositoryError> {
    let cardinality = Cardinality::parse(&row.cardinality).ok_or_else(|| {
        RelationshipRepositoryError::query(format!(
            "corrupted cardinality in database: {}",
            row.cardinality
        ))
    })?;

    Ok(ObjectRelationship {
        id: row.id,
        source_id: row.source_id,
        target_id: row.target_id,
        rel_type: row.rel_type,
        cardinality,
        bidirectional: row.bidirectional,
        inverse_type: row.inverse_type,
        strength: row.strength,
        display_order: row.display_order,
        metadata: row.metadata,
        active: row.active,
        created_at: row.created_at,
        created_by: row.created_by,
        modified_at: row.modified_at,
        modified_by: row.modified_by,
    })
}

#[async_trait]
impl RelationshipRepository for DieselRelationshipRepository {
    async fn commit_link(
        &self,
        relationship: ObjectRelationship,
        journal: EventJournalRecord,
        outbox: OutboxEntry,
    ) -> Result<(), RelationshipRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let relationship = &relationship;
            let journal = &journal;
            let outbox = &outbox;
            async move {
                diesel::insert_into(meta_object_relationships::table)
                    .values(NewRelationshipRow::from_relationship(relationship))
                    .execute(conn)
                    .await?;
                diesel::insert_into(meta_object_events::table)
                    .values(NewJournalRow::from_record(journal))
                    .execute(conn)
                    .await?;
                diesel::insert_into(meta_outbox_entries::table)
                    .values(NewOutboxRow::from_entry(outbox))
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel)
    }

    async fn commit_unlink(
        &self,
        relationship_id: Uuid,
        journal: EventJournalRecord,
        outbox: OutboxEntry,
    ) -> Result<bool, RelationshipRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let journal = &journal;
            let outbox = &outbox;
            async move {
                let removed = diesel::delete(
                    meta_object_relationships::table
                        .filter(meta_object_relationships::id.eq(relationship_id)),
                )
                .execute(conn)
                .await?;
                if removed == 0 {
                    // No edge, no event: skip the journal and outbox writes.
                    return Ok(false);
                }

                diesel::insert_into(meta_object_events::table)
                    .values(NewJournalRow::from_record(journal))
                    .execute(conn)
                    .await?;
                diesel::insert_into(meta_outbox_entries::table)
                    .values(NewOutboxRow::from_entry(outbox))
                    .execute(conn)
                    .await?;
                Ok(true)
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel)
    }

    async fn find_edge(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        rel_type: &str,
    ) -> Result<Option<ObjectRelationship>, RelationshipRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let row: Option<RelationshipRow> = meta_object_relationships::table
            .filter(meta_object_relationships::source_id.eq(source_id))
            .filter(meta_object_relationships::target_id.eq(target_id))
            .filter(meta_object_relationships::rel_type.eq(rel_type))
            .select(RelationshipRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel)?;
        row.map(row_to_relationship).transpose()
    }

    async fn edges_from(
        &self,
        source_id: Uuid,
    ) -> Result<Vec<ObjectRelationship>, RelationshipRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let rows: Vec<RelationshipRow> = meta_object_relationships::table
            .filter(meta_object_relationships::source_id.eq(source_id))
            .filter(meta_object_relationships::active.eq(true))
            .order((
                meta_object_relationships::display_order.asc().nulls_last(),
                meta_object_relationships::created_at.asc(),
            ))
            .select(RelationshipRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel)?;
        rows.into_iter().map(row_to_relationship).collect()
    }

    async fn edges_to(
        &self,
        target_id: Uuid,
    ) -> Result<Vec<ObjectRelationship>, RelationshipRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool)?;

        let rows: Vec<RelationshipRow> = meta_object_relationships::table
            .filter(meta_object_relationships::target_id.eq(target_id))
            .filter(meta_object_relationships::active.eq(true))
            .order((
                meta_object_relationships::display_order.asc().nulls_last(),
                meta_object_relationships::created_at.asc(),
            ))
            .select(RelationshipRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel)?;
        rows.into_iter().map(row_to_relationship).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn unique_violations_map_to_duplicate_edge() {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};

        let error = DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new("duplicate key".to_owned()),
        );
        assert_eq!(map_diesel(error), RelationshipRepositoryError::duplicate_edge());
    }

    #[rstest]
    fn foreign_key_violations_map_to_missing_endpoint() {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};

        let error = DieselError::DatabaseError(
            DatabaseErrorKind::ForeignKeyViolation,
            Box::new("fk violated".to_owned()),
        );
        assert!(matches!(
            map_diesel(error),
            RelationshipRepositoryError::MissingEndpoint { .. }
        ));
    }
}
