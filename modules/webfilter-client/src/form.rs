//! Flattening of nested payloads for `application/x-www-form-urlencoded` subscribers.

use serde_json::{Map, Value};

const SEPARATOR: &str = "_";

/// Flatten a JSON object into ordered `key=value` pairs.
///
/// Nested objects are joined with `_` (`{"user": {"id": 4}}` becomes
/// `user_id=4`). Strings are sent verbatim; every other leaf, arrays included,
/// is sent as its JSON text. A non-object payload flattens to nothing.
pub fn flatten_form(payload: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Value::Object(map) = payload {
        flatten_into(map, "", &mut pairs);
    }
    pairs
}

fn flatten_into(map: &Map<String, Value>, parent: &str, pairs: &mut Vec<(String, String)>) {
    for (key, value) in map {
        let name = if parent.is_empty() {
            key.clone()
        } else {
            format!("{parent}{SEPARATOR}{key}")
        };
        match value {
            Value::Object(nested) => flatten_into(nested, &name, pairs),
            Value::String(s) => pairs.push((name, s.clone())),
            other => pairs.push((name, other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_keys_are_joined_with_underscore() {
        let pairs = flatten_form(&json!({
            "user": {"id": 4, "username": "andres"},
            "mode": "honor",
        }));
        assert_eq!(
            pairs,
            vec![
                ("user_id".to_string(), "4".to_string()),
                ("user_username".to_string(), "andres".to_string()),
                ("mode".to_string(), "honor".to_string()),
            ]
        );
    }

    #[test]
    fn non_string_leaves_use_json_text() {
        let pairs = flatten_form(&json!({"a": null, "b": true, "c": [1, 2]}));
        assert_eq!(pairs[0].1, "null");
        assert_eq!(pairs[1].1, "true");
        assert_eq!(pairs[2].1, "[1,2]");
    }

    #[test]
    fn non_object_payload_is_empty() {
        assert!(flatten_form(&json!("just a string")).is_empty());
    }
}
