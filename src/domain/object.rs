//! The live object record and its status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::context::{ActorContext, TenantId};

/// Lifecycle status of a stored object.
///
/// Transitions:
/// - `ACTIVE ⇄ INACTIVE` and `ACTIVE → ARCHIVED` via `change_status`;
/// - any non-deleted status `→ DELETED` via soft delete;
/// - `DELETED → ACTIVE` via restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectStatus {
    Active,
    Inactive,
    Archived,
    Deleted,
}

impl ObjectStatus {
    /// Stable string form stored in the database and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Archived => "ARCHIVED",
            Self::Deleted => "DELETED",
        }
    }

    /// Parse the stored string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(Self::Active),
            "INACTIVE" => Some(Self::Inactive),
            "ARCHIVED" => Some(Self::Archived),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Whether `change_status` may move an object from `self` to `target`.
    ///
    /// Soft delete and restore have their own operations; DELETED is never
    /// a valid `change_status` endpoint on either side.
    pub fn can_transition_to(&self, target: ObjectStatus) -> bool {
        matches!(
            (self, target),
            (Self::Active, Self::Inactive)
                | (Self::Inactive, Self::Active)
                | (Self::Active, Self::Archived)
        )
    }
}

impl std::fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One live object row.
///
/// ## Invariants
/// - `version >= 1`; every committed mutation increments it by exactly one.
/// - `deleted == true` implies `deleted_at` is set and `status == Deleted`.
/// - `(tenant_id, type_code, code)` is unique among non-deleted rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub type_code: String,
    pub code: String,
    pub name: String,
    pub data: Value,
    pub status: ObjectStatus,
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

impl StoredObject {
    /// Assemble a fresh object at version 1 with status ACTIVE.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        id: Uuid,
        tenant_id: TenantId,
        type_code: String,
        code: String,
        name: String,
        data: Value,
        actor: &ActorContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            type_code,
            code,
            name,
            data,
            status: ObjectStatus::Active,
            version: 1,
            deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            created_by: actor.user.clone(),
            modified_at: now,
            modified_by: actor.user.clone(),
            metadata: None,
        }
    }

    /// Bump the version and refresh modification audit fields.
    pub fn touch(&mut self, actor: &ActorContext, now: DateTime<Utc>) {
        self.version += 1;
        self.modified_at = now;
        self.modified_by = actor.user.clone();
    }

    /// Apply a soft delete: the row is retained, flagged, and versioned.
    pub fn mark_deleted(&mut self, actor: &ActorContext, now: DateTime<Utc>) {
        self.deleted = true;
        self.deleted_at = Some(now);
        self.deleted_by = Some(actor.user.clone());
        self.status = ObjectStatus::Deleted;
        self.touch(actor, now);
    }

    /// Undo a soft delete, returning the object to ACTIVE.
    pub fn mark_restored(&mut self, actor: &ActorContext, now: DateTime<Utc>) {
        self.deleted = false;
        self.deleted_at = None;
        self.deleted_by = None;
        self.status = ObjectStatus::Active;
        self.touch(actor, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn sample() -> StoredObject {
        StoredObject::create(
            Uuid::new_v4(),
            TenantId::random(),
            "CAND".to_owned(),
            "C-1".to_owned(),
            "Candidate one".to_owned(),
            json!({"n": 1}),
            &ActorContext::new("ada"),
            Utc::now(),
        )
    }

    #[rstest]
    #[case(ObjectStatus::Active, ObjectStatus::Inactive, true)]
    #[case(ObjectStatus::Inactive, ObjectStatus::Active, true)]
    #[case(ObjectStatus::Active, ObjectStatus::Archived, true)]
    #[case(ObjectStatus::Inactive, ObjectStatus::Archived, false)]
    #[case(ObjectStatus::Archived, ObjectStatus::Active, false)]
    #[case(ObjectStatus::Active, ObjectStatus::Deleted, false)]
    #[case(ObjectStatus::Deleted, ObjectStatus::Active, false)]
    fn status_machine_edges(
        #[case] from: ObjectStatus,
        #[case] to: ObjectStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[rstest]
    #[case("ACTIVE", Some(ObjectStatus::Active))]
    #[case("DELETED", Some(ObjectStatus::Deleted))]
    #[case("draft", None)]
    fn parse_round_trip(#[case] raw: &str, #[case] expected: Option<ObjectStatus>) {
        assert_eq!(ObjectStatus::parse(raw), expected);
        if let Some(status) = expected {
            assert_eq!(status.as_str(), raw);
        }
    }

    #[test]
    fn create_starts_at_version_one_active() {
        let object = sample();
        assert_eq!(object.version, 1);
        assert_eq!(object.status, ObjectStatus::Active);
        assert!(!object.deleted);
    }

    #[test]
    fn delete_then_restore_preserves_data_and_bumps_version_twice() {
        let mut object = sample();
        let data = object.data.clone();
        let actor = ActorContext::new("ada");

        object.mark_deleted(&actor, Utc::now());
        assert!(object.deleted);
        assert_eq!(object.status, ObjectStatus::Deleted);
        assert!(object.deleted_at.is_some());
        assert_eq!(object.version, 2);

        object.mark_restored(&actor, Utc::now());
        assert!(!object.deleted);
        assert_eq!(object.status, ObjectStatus::Active);
        assert!(object.deleted_at.is_none());
        assert_eq!(object.version, 3);
        assert_eq!(object.data, data);
    }

    #[test]
    fn touch_updates_modification_audit() {
        let mut object = sample();
        let later = Utc::now();
        object.touch(&ActorContext::new("grace"), later);
        assert_eq!(object.version, 2);
        assert_eq!(object.modified_by, "grace");
        assert_eq!(object.modified_at, later);
    }
}
