//! Recursive override merge for parameter trees
//!
//! For every key in the overrides: nested objects merge into the matching
//! base object (an absent or non-object base value counts as empty), any
//! other value replaces the base value outright. Base keys that the
//! overrides never mention are kept as-is.

use serde_json::{Map, Value};

/// Merge `overrides` onto a copy of `base`.
///
/// Neither input is modified.
pub fn merge(base: &Value, overrides: &Map<String, Value>) -> Value {
    let mut merged = base.clone();
    merge_into(&mut merged, overrides);
    merged
}

fn merge_into(target: &mut Value, overrides: &Map<String, Value>) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(table) = target else {
        return;
    };

    for (key, value) in overrides {
        match value {
            Value::Object(nested) => {
                let slot = table
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                merge_into(slot, nested);
            }
            other => {
                table.insert(key.clone(), other.clone());
            }
        }
    }
}
