//! Immutable version snapshots: one row per committed mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::context::TenantId;

/// Kind of change a version row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    Restore,
    StatusChange,
}

impl ChangeType {
    /// Stable string form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Restore => "RESTORE",
            Self::StatusChange => "STATUS_CHANGE",
        }
    }

    /// Parse the stored string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATE" => Some(Self::Create),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            "RESTORE" => Some(Self::Restore),
            "STATUS_CHANGE" => Some(Self::StatusChange),
            _ => None,
        }
    }
}

/// One append-only snapshot of an object at a version boundary.
///
/// ## Invariants
/// - `(object_id, version_number)` is unique; rows are never updated or
///   deleted.
/// - CREATE rows have `previous_data = None`; DELETE rows have
///   `current_data = None`.
/// - `version_number` equals the object's `version` after the change.
///
/// Object identity fields (`type_code`, `code`, `name`, `status`) are
/// denormalised at snapshot time so history reads never join the live table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: Uuid,
    pub object_id: Uuid,
    pub tenant_id: TenantId,
    pub type_code: String,
    pub code: String,
    pub name: String,
    pub status: String,
    pub version_number: i32,
    pub change_type: ChangeType,
    pub previous_data: Option<Value>,
    pub current_data: Option<Value>,
    pub diff: Option<Value>,
    pub changed_by: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub change_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ChangeType::Create, "CREATE")]
    #[case(ChangeType::Update, "UPDATE")]
    #[case(ChangeType::Delete, "DELETE")]
    #[case(ChangeType::Restore, "RESTORE")]
    #[case(ChangeType::StatusChange, "STATUS_CHANGE")]
    fn change_type_round_trips(#[case] kind: ChangeType, #[case] raw: &str) {
        assert_eq!(kind.as_str(), raw);
        assert_eq!(ChangeType::parse(raw), Some(kind));
    }

    #[test]
    fn unknown_change_type_is_rejected() {
        assert_eq!(ChangeType::parse("MERGE"), None);
    }
}
