//! Builds version snapshots for the mutation pipeline.
//!
//! The versioner performs no business checks and no I/O: it records what it
//! is given, and the snapshot it builds is committed inside the same
//! transaction as the state change.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::context::ActorContext;
use super::diff;
use super::object::StoredObject;
use super::version::{ChangeType, VersionRecord};

/// Snapshot builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Versioner;

impl Versioner {
    /// Build the version row for a mutation that just produced `object`.
    ///
    /// - `version_number` is the object's post-mutation version.
    /// - UPDATE computes the structural diff against the pre-image; other
    ///   change types store no diff.
    /// - CREATE has no pre-image; DELETE has no post-image.
    pub fn snapshot(
        &self,
        object: &StoredObject,
        change_type: ChangeType,
        previous_data: Option<Value>,
        change_reason: Option<String>,
        actor: &ActorContext,
        now: DateTime<Utc>,
    ) -> VersionRecord {
        let current_data = match change_type {
            ChangeType::Delete => None,
            _ => Some(object.data.clone()),
        };

        let diff_value = match (change_type, &previous_data, &current_data) {
            (ChangeType::Update, Some(old), Some(new)) => {
                diff::diff(old, new).map(|document| document.to_value())
            }
            _ => None,
        };

        VersionRecord {
            id: Uuid::new_v4(),
            object_id: object.id,
            tenant_id: object.tenant_id,
            type_code: object.type_code.clone(),
            code: object.code.clone(),
            name: object.name.clone(),
            status: object.status.as_str().to_owned(),
            version_number: object.version,
            change_type,
            previous_data,
            current_data,
            diff: diff_value,
            changed_by: actor.user.clone(),
            ip: actor.ip.clone(),
            user_agent: actor.user_agent.clone(),
            change_reason,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::TenantId;
    use serde_json::json;

    fn object(data: Value, version: i32) -> StoredObject {
        let mut object = StoredObject::create(
            Uuid::new_v4(),
            TenantId::random(),
            "CAND".to_owned(),
            "C-1".to_owned(),
            "Candidate".to_owned(),
            data,
            &ActorContext::new("ada"),
            Utc::now(),
        );
        object.version = version;
        object
    }

    #[test]
    fn create_snapshot_has_no_pre_image_and_no_diff() {
        let object = object(json!({"n": 1}), 1);
        let record = Versioner.snapshot(
            &object,
            ChangeType::Create,
            None,
            None,
            &ActorContext::new("ada"),
            Utc::now(),
        );

        assert_eq!(record.version_number, 1);
        assert_eq!(record.change_type, ChangeType::Create);
        assert_eq!(record.previous_data, None);
        assert_eq!(record.current_data, Some(json!({"n": 1})));
        assert_eq!(record.diff, None);
    }

    #[test]
    fn update_snapshot_records_the_structural_diff() {
        let object = object(json!({"a": 1, "b": 3, "c": 4}), 2);
        let record = Versioner.snapshot(
            &object,
            ChangeType::Update,
            Some(json!({"a": 1, "b": 2})),
            None,
            &ActorContext::new("ada"),
            Utc::now(),
        );

        assert_eq!(record.version_number, 2);
        assert_eq!(
            record.diff,
            Some(json!({
                "modified": {"b": {"old": 2, "new": 3}},
                "added": {"c": 4},
            }))
        );
    }

    #[test]
    fn identical_update_stores_null_diff() {
        let object = object(json!({"a": 1}), 3);
        let record = Versioner.snapshot(
            &object,
            ChangeType::Update,
            Some(json!({"a": 1})),
            None,
            &ActorContext::new("ada"),
            Utc::now(),
        );

        assert_eq!(record.diff, None);
        assert_eq!(record.previous_data, record.current_data);
    }

    #[test]
    fn delete_snapshot_drops_the_post_image() {
        let object = object(json!({"n": 1}), 2);
        let record = Versioner.snapshot(
            &object,
            ChangeType::Delete,
            Some(json!({"n": 1})),
            Some("cleanup".to_owned()),
            &ActorContext::new("ada"),
            Utc::now(),
        );

        assert_eq!(record.current_data, None);
        assert_eq!(record.previous_data, Some(json!({"n": 1})));
        assert_eq!(record.change_reason.as_deref(), Some("cleanup"));
    }

    #[test]
    fn status_change_keeps_data_and_carries_the_reason() {
        let object = object(json!({"n": 1}), 4);
        let record = Versioner.snapshot(
            &object,
            ChangeType::StatusChange,
            None,
            Some("ACTIVE -> INACTIVE: seasonal".to_owned()),
            &ActorContext::new("ada"),
            Utc::now(),
        );

        assert_eq!(record.change_type, ChangeType::StatusChange);
        assert_eq!(record.current_data, Some(json!({"n": 1})));
        assert_eq!(record.diff, None);
        assert!(record
            .change_reason
            .as_deref()
            .is_some_and(|reason| reason.contains("INACTIVE")));
    }

    #[test]
    fn actor_metadata_is_recorded() {
        let object = object(json!({}), 1);
        let actor = ActorContext::new("grace")
            .with_ip("10.1.1.1")
            .with_user_agent("cli/2.0");
        let record = Versioner.snapshot(
            &object,
            ChangeType::Create,
            None,
            None,
            &actor,
            Utc::now(),
        );

        assert_eq!(record.changed_by, "grace");
        assert_eq!(record.ip.as_deref(), Some("10.1.1.1"));
        assert_eq!(record.user_agent.as_deref(), Some("cli/2.0"));
    }
}
