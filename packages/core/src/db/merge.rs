//! Shallow merge used by `update_document` and `update_link`
//!
//! Top-level keys of the patch overwrite the stored value; every other key is
//! kept as-is. Nested objects are replaced whole, never merged recursively.

use crate::db::error::{Result, StoreError};
use serde_json::{Map, Value};

/// Merge `patch` into `current`, returning the new stored value
///
/// The patch must be a JSON object. A stored value that is not an object is
/// treated as empty, so the result is always an object.
pub fn shallow_merge(collection: &str, current: Value, patch: &Value) -> Result<Value> {
    let patch = patch.as_object().ok_or_else(|| {
        StoreError::invalid_payload(collection, "update payload must be a JSON object")
    })?;

    let mut merged = match current {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }

    Ok(Value::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_untouched_fields_are_preserved() {
        let merged = shallow_merge("c", json!({"a": 1, "b": 2}), &json!({"b": 3})).unwrap();
        assert_eq!(merged, json!({"a": 1, "b": 3}));
    }

    #[test]
    fn test_nested_objects_are_replaced_not_merged() {
        let merged = shallow_merge(
            "c",
            json!({"prefs": {"email": true, "digest": "weekly"}}),
            &json!({"prefs": {"email": false}}),
        )
        .unwrap();
        assert_eq!(merged, json!({"prefs": {"email": false}}));
    }

    #[test]
    fn test_null_in_patch_overwrites() {
        let merged = shallow_merge("c", json!({"bio": "hi"}), &json!({"bio": null})).unwrap();
        assert_eq!(merged, json!({"bio": null}));
    }

    #[test]
    fn test_non_object_patch_is_rejected() {
        let err = shallow_merge("profiles", json!({}), &json!([1, 2])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload { .. }));
    }
}
