//! JSON merge patch (RFC 7386) helpers used for status writes.

use serde_json::{Map, Value};

/// Merge patch turning `base` into `new`
///
/// Objects are diffed key by key; removed keys become `null`; arrays and
/// scalars are replaced wholesale. Returns an empty object when nothing changed.
#[must_use]
pub fn merge_diff(base: &Value, new: &Value) -> Value {
    match (base, new) {
        (Value::Object(base), Value::Object(new)) => {
            let mut patch = Map::new();
            for (key, new_value) in new {
                match base.get(key) {
                    Some(base_value) if base_value == new_value => {}
                    Some(base_value @ Value::Object(_)) if new_value.is_object() => {
                        patch.insert(key.clone(), merge_diff(base_value, new_value));
                    }
                    _ => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            for key in base.keys() {
                if !new.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        _ => new.clone(),
    }
}

/// Whether a merge patch changes nothing
#[must_use]
pub fn is_empty_patch(patch: &Value) -> bool {
    patch.as_object().is_some_and(Map::is_empty)
}

/// Apply a merge patch to `target` in place
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                apply_merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_diff_only_changed_fields() {
        let conditions = json!([{"type": "Ready"}]);
        let base = json!({"observedGeneration": 1, "externalId": "a", "conditions": conditions});
        let new = json!({"observedGeneration": 2, "externalId": "a", "conditions": conditions});
        assert_eq!(merge_diff(&base, &new), json!({"observedGeneration": 2}));
    }

    #[test]
    fn test_merge_diff_removed_key_is_null() {
        let base = json!({"appliedHash": "x", "externalId": "a"});
        let new = json!({"externalId": "a"});
        assert_eq!(merge_diff(&base, &new), json!({"appliedHash": null}));
    }

    #[test]
    fn test_merge_diff_unchanged_is_empty() {
        let status = json!({"conditions": [], "externalId": "a"});
        assert!(is_empty_patch(&merge_diff(&status, &status)));
    }

    #[test]
    fn test_apply_merge_patch_reproduces_new() {
        let base = json!({"a": {"b": 1, "c": 2}, "d": [1, 2], "e": "x"});
        let new = json!({"a": {"b": 1, "c": 3}, "d": [3]});
        let patch = merge_diff(&base, &new);
        let mut target = base.clone();
        apply_merge_patch(&mut target, &patch);
        assert_eq!(target, new);
    }
}
