//! Partial-update merge rules.

use serde_json::Value;

/// Returns true for values an update treats as "no change".
///
/// Blank strings (empty or whitespace only), empty arrays and `null` are
/// blank. Numbers, booleans and objects never are.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Applies the non-blank fields of `patch` onto `document`.
///
/// Values are written as provided, without trimming. Returns the names of the
/// fields that were written. Does nothing unless both sides are objects.
pub fn merge_patch(document: &mut Value, patch: &Value) -> Vec<String> {
    let (Value::Object(target), Value::Object(fields)) = (document, patch) else {
        return Vec::new();
    };

    let mut written = Vec::new();
    for (name, value) in fields {
        if is_blank(value) {
            continue;
        }
        target.insert(name.clone(), value.clone());
        written.push(name.clone());
    }
    written
}
