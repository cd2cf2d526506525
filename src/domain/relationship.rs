//! Directed, typed edges between objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Declared multiplicity of a relationship. Informational; the store does
/// not enforce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(rename = "1:1")]
    OneToOne,
    #[serde(rename = "1:N")]
    OneToMany,
    #[serde(rename = "N:N")]
    ManyToMany,
}

impl Cardinality {
    /// Stable string form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "1:1",
            Self::OneToMany => "1:N",
            Self::ManyToMany => "N:N",
        }
    }

    /// Parse the stored string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "1:1" => Some(Self::OneToOne),
            "1:N" => Some(Self::OneToMany),
            "N:N" => Some(Self::ManyToMany),
            _ => None,
        }
    }
}

/// One edge row.
///
/// Edges are owned by neither endpoint: they are independent rows that are
/// deactivated when an endpoint is soft-deleted. `(source_id, target_id,
/// rel_type)` is unique. A bidirectional edge is a single physical row;
/// navigation from the target side is symmetric, with `inverse_type`
/// serving as the display label for that direction when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRelationship {
    pub id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub rel_type: String,
    pub cardinality: Cardinality,
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

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Cardinality::OneToOne, "1:1")]
    #[case(Cardinality::OneToMany, "1:N")]
    #[case(Cardinality::ManyToMany, "N:N")]
    fn cardinality_round_trips(#[case] kind: Cardinality, #[case] raw: &str) {
        assert_eq!(kind.as_str(), raw);
        assert_eq!(Cardinality::parse(raw), Some(kind));
    }

    #[test]
    fn unknown_cardinality_is_rejected() {
        assert_eq!(Cardinality::parse("M:1"), None);
    }
}
