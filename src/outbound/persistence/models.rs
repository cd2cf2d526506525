//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. Read rows are converted to domain types
//! by the repositories; insert rows are built here from domain values so
//! every repository shares one mapping.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::event::EventJournalRecord;
use crate::domain::object::StoredObject;
use crate::domain::outbox::OutboxEntry;
use crate::domain::relationship::ObjectRelationship;
use crate::domain::version::VersionRecord;

use super::schema::{
    meta_kernel_objects, meta_object_events, meta_object_relationships, meta_object_versions,
    meta_outbox_entries, meta_type_descriptors,
};

/// Row struct for reading from the objects table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = meta_kernel_objects)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ObjectRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub type_code: String,
    pub code: String,
    pub name: String,
    pub data: Value,
    pub status: String,
    pub version: i32,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub modified_at: DateTime<Utc>,
    pub modified_by: String,
    pub metadata: Option<Value>,
}

/// Insertable struct for creating object rows.
#[derive(Debug, Insertable)]
#[diesel(table_name = meta_kernel_objects)]
pub(crate) struct NewObjectRow<'a> {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub type_code: &'a str,
    pub code: &'a str,
    pub name: &'a str,
    pub data: &'a Value,
    pub status: &'a str,
    pub version: i32,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: &'a str,
    pub modified_at: DateTime<Utc>,
    pub modified_by: &'a str,
    pub metadata: Option<&'a Value>,
}

impl<'a> NewObjectRow<'a> {
    pub fn from_object(object: &'a StoredObject) -> Self {
        Self {
            id: object.id,
            tenant_id: *object.tenant_id.as_uuid(),
            type_code: &object.type_code,
            code: &object.code,
            name: &object.name,
            data: &object.data,
            status: object.status.as_str(),
            version: object.version,
            deleted: object.deleted,
            created_at: object.created_at,
            created_by: &object.created_by,
            modified_at: object.modified_at,
            modified_by: &object.modified_by,
            metadata: object.metadata.as_ref(),
        }
    }
}

/// Changeset applied by the guarded update in `commit_mutation`.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = meta_kernel_objects)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct ObjectChangeset<'a> {
    pub name: &'a str,
    pub data: &'a Value,
    pub status: &'a str,
    pub version: i32,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<&'a str>,
    pub modified_at: DateTime<Utc>,
    pub modified_by: &'a str,
    pub metadata: Option<&'a Value>,
}

impl<'a> ObjectChangeset<'a> {
    pub fn from_object(object: &'a StoredObject) -> Self {
        Self {
            name: &object.name,
            data: &object.data,
            status: object.status.as_str(),
            version: object.version,
            deleted: object.deleted,
            deleted_at: object.deleted_at,
            deleted_by: object.deleted_by.as_deref(),
            modified_at: object.modified_at,
            modified_by: &object.modified_by,
            metadata: object.metadata.as_ref(),
        }
    }
}

/// Row struct for reading version snapshots.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = meta_object_versions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct VersionRow {
    pub id: Uuid,
    pub object_id: Uuid,
    pub tenant_id: Uuid,
    pub type_code: String,
    pub code: String,
    pub name: String,
    pub status: String,
    pub version_number: i32,
    pub change_type: String,
    pub previous_data: Option<Value>,
    pub current_data: Option<Value>,
    pub diff: Option<Value>,
    pub changed_by: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub change_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insertable struct for appending version snapshots.
#[derive(Debug, Insertable)]
#[diesel(table_name = meta_object_versions)]
pub(crate) struct NewVersionRow<'a> {
    pub id: Uuid,
    pub object_id: Uuid,
    pub tenant_id: Uuid,
    pub type_code: &'a str,
    pub code: &'a str,
    pub name: &'a str,
    pub status: &'a str,
    pub version_number: i32,
    pub change_type: &'a str,
    pub previous_data: Option<&'a Value>,
    pub current_data: Option<&'a Value>,
    pub diff: Option<&'a Value>,
    pub changed_by: &'a str,
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub change_reason: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

impl<'a> NewVersionRow<'a> {
    pub fn from_record(record: &'a VersionRecord) -> Self {
        Self {
            id: record.id,
            object_id: record.object_id,
            tenant_id: *record.tenant_id.as_uuid(),
            type_code: &record.type_code,
            code: &record.code,
            name: &record.name,
            status: &record.status,
            version_number: record.version_number,
            change_type: record.change_type.as_str(),
            previous_data: record.previous_data.as_ref(),
            current_data: record.current_data.as_ref(),
            diff: record.diff.as_ref(),
            changed_by: &record.changed_by,
            ip: record.ip.as_deref(),
            user_agent: record.user_agent.as_deref(),
            change_reason: record.change_reason.as_deref(),
            created_at: record.created_at,
        }
    }
}

/// Row struct for reading relationship edges.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = meta_object_relationships)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RelationshipRow {
    pub id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub rel_type: String,
    pub cardinality: String,
    pub bidirectional: bool,
    pub inverse_type: Option<String>,
    pub strength: Option<f64>,
    pub display_order: Option<i32>,
    pub metadata: Option<Value>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub modified_at: DateTime<Utc>,
    pub modified_by: String,
}

/// Insertable struct for creating relationship edges.
#[derive(Debug, Insertable)]
#[diesel(table_name = meta_object_relationships)]
pub(crate) struct NewRelationshipRow<'a> {
    pub id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub rel_type: &'a str,
    pub cardinality: &'a str,
    pub bidirectional: bool,
    pub inverse_type: Option<&'a str>,
    pub strength: Option<f64>,
    pub display_order: Option<i32>,
    pub metadata: Option<&'a Value>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: &'a str,
    pub modified_at: DateTime<Utc>,
    pub modified_by: &'a str,
}

impl<'a> NewRelationshipRow<'a> {
    pub fn from_relationship(relationship: &'a ObjectRelationship) -> Self {
        Self {
            id: relationship.id,
            source_id: relationship.source_id,
            target_id: relationship.target_id,
            rel_type: &relationship.rel_type,
            cardinality: relationship.cardinality.as_str(),
            bidirectional: relationship.bidirectional,
            inverse_type: relationship.inverse_type.as_deref(),
            strength: relationship.strength,
            display_order: relationship.display_order,
            metadata: relationship.metadata.as_ref(),
            active: relationship.active,
            created_at: relationship.created_at,
            created_by: &relationship.created_by,
            modified_at: relationship.modified_at,
            modified_by: &relationship.modified_by,
        }
    }
}

/// Row struct for reading outbox entries, both from DSL queries and from
/// the raw claim statement.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = meta_outbox_entries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct OutboxRow {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_type: String,
    pub payload: Value,
    pub status: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub topic: Option<String>,
    pub partition: Option<i32>,
    pub bus_offset: Option<i64>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub idempotency_key: String,
    pub claimed_by: Option<String>,
    pub claimed_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insertable struct for enqueuing outbox entries.
#[derive(Debug, Insertable)]
#[diesel(table_name = meta_outbox_entries)]
pub(crate) struct NewOutboxRow<'a> {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: &'a str,
    pub event_type: &'a str,
    pub payload: &'a Value,
    pub status: &'a str,
    pub retry_count: i32,
    pub max_retries: i32,
    pub idempotency_key: &'a str,
    pub created_at: DateTime<Utc>,
}

impl<'a> NewOutboxRow<'a> {
    pub fn from_entry(entry: &'a OutboxEntry) -> Self {
        Self {
            id: entry.id,
            aggregate_id: entry.aggregate_id,
            aggregate_type: &entry.aggregate_type,
            event_type: &entry.event_type,
            payload: &entry.payload,
            status: entry.status.as_str(),
            retry_count: entry.retry_count,
            max_retries: entry.max_retries,
            idempotency_key: &entry.idempotency_key,
            created_at: entry.created_at,
        }
    }
}

/// Row struct for reading journal entries.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = meta_object_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct JournalRow {
    pub id: Uuid,
    pub object_id: Uuid,
    pub tenant_id: Uuid,
    pub event_type: String,
    pub payload: Value,
    pub status: String,
    pub topic: Option<String>,
    pub partition: Option<i32>,
    pub bus_offset: Option<i64>,
    pub error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insertable struct for journal rows.
#[derive(Debug, Insertable)]
#[diesel(table_name = meta_object_events)]
pub(crate) struct NewJournalRow<'a> {
    pub id: Uuid,
    pub object_id: Uuid,
    pub tenant_id: Uuid,
    pub event_type: &'a str,
    pub payload: &'a Value,
    pub status: &'a str,
    pub created_at: DateTime<Utc>,
}

impl<'a> NewJournalRow<'a> {
    pub fn from_record(record: &'a EventJournalRecord) -> Self {
        Self {
            id: record.id,
            object_id: record.object_id,
            tenant_id: *record.tenant_id.as_uuid(),
            event_type: &record.event_type,
            payload: &record.payload,
            status: record.status.as_str(),
            created_at: record.created_at,
        }
    }
}

/// Row struct for reading type descriptors.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = meta_type_descriptors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DescriptorRow {
    pub id: Uuid,
    pub type_code: String,
    pub type_name: String,
    pub descriptor: Value,
    pub synced_at: DateTime<Utc>,
    pub stale: bool,
    pub ttl_minutes: i32,
    pub usage_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    #[expect(dead_code, reason = "schema field not exposed through the domain")]
    pub created_at: DateTime<Utc>,
    #[expect(dead_code, reason = "schema field not exposed through the domain")]
    pub modified_at: DateTime<Utc>,
}

/// Insertable struct for descriptor upserts.
#[derive(Debug, Insertable)]
#[diesel(table_name = meta_type_descriptors)]
pub(crate) struct NewDescriptorRow<'a> {
    pub id: Uuid,
    pub type_code: &'a str,
    pub type_name: &'a str,
    pub descriptor: &'a Value,
    pub synced_at: DateTime<Utc>,
    pub stale: bool,
    pub ttl_minutes: i32,
    pub usage_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
}
