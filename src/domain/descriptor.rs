//! Cached type descriptors synced from the external metadata authority.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One cached descriptor for an object type.
///
/// Descriptors enrich create-time validation with presence checks; the store
/// itself stays schema-flexible. A row is *valid for use* while it is not
/// stale and its TTL has not elapsed since the last sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub id: Uuid,
    pub type_code: String,
    pub type_name: String,
    /// Raw descriptor document; `required` holds attribute names that must
    /// be present in object data.
    pub descriptor: Value,
    pub synced_at: DateTime<Utc>,
    pub stale: bool,
    pub ttl_minutes: i32,
    pub usage_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl TypeDescriptor {
    /// Whether the cached row may be consulted at `now`.
    pub fn is_valid_for_use(&self, now: DateTime<Utc>) -> bool {
        !self.stale && now < self.synced_at + Duration::minutes(i64::from(self.ttl_minutes))
    }

    /// Attribute names the descriptor declares as required, if any.
    pub fn required_attributes(&self) -> Vec<&str> {
        self.descriptor
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn descriptor(stale: bool, ttl_minutes: i32, synced_at: DateTime<Utc>) -> TypeDescriptor {
        TypeDescriptor {
            id: Uuid::new_v4(),
            type_code: "CAND".to_owned(),
            type_name: "Candidate".to_owned(),
            descriptor: json!({"required": ["email", "name"]}),
            synced_at,
            stale,
            ttl_minutes,
            usage_count: 0,
            last_accessed_at: None,
        }
    }

    #[rstest]
    #[case(false, 60, 0, true)]
    #[case(false, 60, 61, false)]
    #[case(true, 60, 0, false)]
    fn validity_requires_freshness_and_not_stale(
        #[case] stale: bool,
        #[case] ttl: i32,
        #[case] age_minutes: i64,
        #[case] valid: bool,
    ) {
        let now = Utc::now();
        let row = descriptor(stale, ttl, now - Duration::minutes(age_minutes));
        assert_eq!(row.is_valid_for_use(now), valid);
    }

    #[test]
    fn required_attributes_read_from_descriptor_document() {
        let row = descriptor(false, 60, Utc::now());
        assert_eq!(row.required_attributes(), ["email", "name"]);
    }

    #[test]
    fn missing_required_section_means_no_requirements() {
        let mut row = descriptor(false, 60, Utc::now());
        row.descriptor = json!({"fields": {}});
        assert!(row.required_attributes().is_empty());
    }
}
