//! Structural JSON diff over top-level document fields.
//!
//! The diff is advisory: version rows also store the full pre- and
//! post-images, so the comparison deliberately stays shallow. Nested
//! values are compared by deep equality but reported whole.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

/// Field-level difference between two JSON documents.
///
/// Maps are ordered by key so the rendered diff is deterministic
/// regardless of input field order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiffDocument {
    /// Fields present in `new` but not in `old`.
    pub added: BTreeMap<String, Value>,
    /// Fields present in both with unequal values, as `{old, new}` pairs.
    pub modified: BTreeMap<String, FieldChange>,
    /// Fields present in `old` but not in `new`.
    pub removed: BTreeMap<String, Value>,
}

/// Old and new value of one modified field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

impl DiffDocument {
    /// True when no field was added, modified, or removed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Render the diff as the stored JSON shape:
    /// `{"added": {...}, "modified": {"k": {"old": .., "new": ..}}, "removed": {...}}`.
    ///
    /// Empty sections are omitted.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        if !self.added.is_empty() {
            out.insert("added".to_owned(), map_to_value(&self.added));
        }
        if !self.modified.is_empty() {
            let modified: Map<String, Value> = self
                .modified
                .iter()
                .map(|(key, change)| {
                    (
                        key.clone(),
                        json!({ "old": change.old, "new": change.new }),
                    )
                })
                .collect();
            out.insert("modified".to_owned(), Value::Object(modified));
        }
        if !self.removed.is_empty() {
            out.insert("removed".to_owned(), map_to_value(&self.removed));
        }
        Value::Object(out)
    }
}

fn map_to_value(map: &BTreeMap<String, Value>) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// Compare two documents field by field.
///
/// Returns `None` when the documents are equal at the top level. Non-object
/// inputs are treated as empty documents, so a scalar-to-scalar comparison
/// yields `None` rather than an error; the mutator rejects non-object
/// payloads before they reach this point.
pub fn diff(old: &Value, new: &Value) -> Option<DiffDocument> {
    let empty = Map::new();
    let old_fields = old.as_object().unwrap_or(&empty);
    let new_fields = new.as_object().unwrap_or(&empty);

    let mut result = DiffDocument::default();

    for (key, new_value) in new_fields {
        match old_fields.get(key) {
            None => {
                result.added.insert(key.clone(), new_value.clone());
            }
            Some(old_value) if old_value != new_value => {
                result.modified.insert(
                    key.clone(),
                    FieldChange {
                        old: old_value.clone(),
                        new: new_value.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }

    for (key, old_value) in old_fields {
        if !new_fields.contains_key(key) {
            result.removed.insert(key.clone(), old_value.clone());
        }
    }

    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn equal_documents_yield_none() {
        let doc = json!({"a": 1, "b": {"nested": true}});
        assert_eq!(diff(&doc, &doc.clone()), None);
    }

    #[test]
    fn field_order_does_not_matter() {
        let old = json!({"a": 1, "b": 2});
        let new = json!({"b": 2, "a": 1});
        assert_eq!(diff(&old, &new), None);
    }

    #[test]
    fn reports_added_modified_and_removed() {
        let old = json!({"a": 1, "b": 2, "gone": "x"});
        let new = json!({"a": 1, "b": 3, "c": 4});

        let result = diff(&old, &new).expect("documents differ");
        assert_eq!(
            result.to_value(),
            json!({
                "modified": {"b": {"old": 2, "new": 3}},
                "added": {"c": 4},
                "removed": {"gone": "x"},
            })
        );
    }

    #[test]
    fn stored_shape_matches_update_scenario() {
        // {a:1,b:2} -> {a:1,b:3,c:4}
        let old = json!({"a": 1, "b": 2});
        let new = json!({"a": 1, "b": 3, "c": 4});

        let result = diff(&old, &new).expect("documents differ");
        assert_eq!(
            result.to_value(),
            json!({
                "modified": {"b": {"old": 2, "new": 3}},
                "added": {"c": 4},
            })
        );
    }

    #[test]
    fn nested_changes_count_as_modified_whole() {
        let old = json!({"profile": {"city": "Oslo"}});
        let new = json!({"profile": {"city": "Bergen"}});

        let result = diff(&old, &new).expect("documents differ");
        assert!(result.modified.contains_key("profile"));
        assert!(result.added.is_empty());
        assert!(result.removed.is_empty());
    }

    #[rstest]
    #[case(json!(null), json!(null))]
    #[case(json!(7), json!(7))]
    #[case(json!([1, 2]), json!([1, 2]))]
    fn non_object_inputs_compare_as_empty(#[case] old: Value, #[case] new: Value) {
        assert_eq!(diff(&old, &new), None);
    }

    #[test]
    fn output_keys_are_sorted() {
        let old = json!({});
        let new = json!({"zeta": 1, "alpha": 2, "mid": 3});

        let result = diff(&old, &new).expect("documents differ");
        let keys: Vec<&String> = result.added.keys().collect();
        assert_eq!(keys, ["alpha", "mid", "zeta"]);
    }
}
