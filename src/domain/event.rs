//! Event envelopes, topic resolution, and the durable event journal.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::context::TenantId;
use super::object::StoredObject;
use super::relationship::ObjectRelationship;

/// Aggregate type recorded on object outbox entries.
pub const OBJECT_AGGREGATE: &str = "KernelObject";
/// Aggregate type recorded on relationship outbox entries.
pub const RELATIONSHIP_AGGREGATE: &str = "ObjectRelationship";

const TOPIC_PREFIX: &str = "platform.kernel.";

/// Event kinds emitted by the mutation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    ObjectCreated,
    ObjectUpdated,
    ObjectDeleted,
    ObjectRestored,
    RelationshipCreated,
    RelationshipDeleted,
}

impl EventType {
    /// Dotted event name carried in envelopes and outbox rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectCreated => "object.created",
            Self::ObjectUpdated => "object.updated",
            Self::ObjectDeleted => "object.deleted",
            Self::ObjectRestored => "object.restored",
            Self::RelationshipCreated => "relationship.created",
            Self::RelationshipDeleted => "relationship.deleted",
        }
    }

    /// Parse the dotted event name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "object.created" => Some(Self::ObjectCreated),
            "object.updated" => Some(Self::ObjectUpdated),
            "object.deleted" => Some(Self::ObjectDeleted),
            "object.restored" => Some(Self::ObjectRestored),
            "relationship.created" => Some(Self::RelationshipCreated),
            "relationship.deleted" => Some(Self::RelationshipDeleted),
            _ => None,
        }
    }
}

/// Resolve the bus topic for an event name, e.g. `object.created` →
/// `platform.kernel.object.created`. Unknown names yield `None` so the
/// dispatcher can fail the row instead of guessing a destination.
pub fn topic_for(event_type: &str) -> Option<String> {
    EventType::parse(event_type).map(|kind| format!("{TOPIC_PREFIX}{}", kind.as_str()))
}

/// Built event envelope: the published JSON plus its identifying fields.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub payload: Value,
}

/// Build the envelope for an object mutation, per the published contract:
///
/// ```json
/// {
///   "eventId": "...", "eventType": "object.updated", "timestamp": "...",
///   "source": "kernel", "tenantId": "...",
///   "data": { "objectId", "objectTypeCode", "objectCode", "status",
///             "version", "payload" }
/// }
/// ```
pub fn object_envelope(
    object: &StoredObject,
    event_type: EventType,
    now: DateTime<Utc>,
) -> EventEnvelope {
    let event_id = Uuid::new_v4();
    let payload = json!({
        "eventId": event_id.to_string(),
        "eventType": event_type.as_str(),
        "timestamp": now.to_rfc3339_opts(SecondsFormat::Millis, true),
        "source": "kernel",
        "tenantId": object.tenant_id.to_string(),
        "data": {
            "objectId": object.id.to_string(),
            "objectTypeCode": object.type_code,
            "objectCode": object.code,
            "status": object.status.as_str(),
            "version": object.version,
            "payload": object.data,
        },
    });
    EventEnvelope {
        event_id,
        event_type,
        payload,
    }
}

/// Build the envelope for a relationship mutation.
pub fn relationship_envelope(
    tenant_id: TenantId,
    relationship: &ObjectRelationship,
    event_type: EventType,
    now: DateTime<Utc>,
) -> EventEnvelope {
    let event_id = Uuid::new_v4();
    let payload = json!({
        "eventId": event_id.to_string(),
        "eventType": event_type.as_str(),
        "timestamp": now.to_rfc3339_opts(SecondsFormat::Millis, true),
        "source": "kernel",
        "tenantId": tenant_id.to_string(),
        "data": {
            "relationshipId": relationship.id.to_string(),
            "sourceObjectId": relationship.source_id.to_string(),
            "targetObjectId": relationship.target_id.to_string(),
            "relationshipType": relationship.rel_type,
            "cardinality": relationship.cardinality.as_str(),
            "bidirectional": relationship.bidirectional,
        },
    });
    EventEnvelope {
        event_id,
        event_type,
        payload,
    }
}

/// Publish state of a journal row; mirrors the outbox entry it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalStatus {
    Pending,
    Published,
    Failed,
}

impl JournalStatus {
    /// Stable string form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Published => "PUBLISHED",
            Self::Failed => "FAILED",
        }
    }

    /// Parse the stored string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "PUBLISHED" => Some(Self::Published),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Durable per-object event log row. The id is the envelope `eventId`, which
/// ties the row to the outbox entry carrying the same envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventJournalRecord {
    pub id: Uuid,
    pub object_id: Uuid,
    pub tenant_id: TenantId,
    pub event_type: String,
    pub payload: Value,
    pub status: JournalStatus,
    pub topic: Option<String>,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EventJournalRecord {
    /// Build the pending journal row for an envelope.
    pub fn pending(
        envelope: &EventEnvelope,
        object_id: Uuid,
        tenant_id: TenantId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: envelope.event_id,
            object_id,
            tenant_id,
            event_type: envelope.event_type.as_str().to_owned(),
            payload: envelope.payload.clone(),
            status: JournalStatus::Pending,
            topic: None,
            partition: None,
            offset: None,
            error: None,
            published_at: None,
            created_at,
        }
    }
}
