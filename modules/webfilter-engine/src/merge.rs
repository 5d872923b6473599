//! Last-write-wins aggregation of subscriber responses.
//!
//! Contributions are folded in subscriber order and each key simply overwrites
//! whatever an earlier subscriber put there, so the last enabled subscriber for
//! an event has the final say on any key it sets. Nothing is validated here.

use serde_json::{Map, Value};
use tracing::debug;

use crate::dispatch::Contributions;

/// Field changes proposed by all subscribers for one dispatch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedPatch(Map<String, Value>);

impl MergedPatch {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Halt requests keyed by halt name, merged the same way as the patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedHaltRequests(Map<String, Value>);

impl MergedHaltRequests {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

pub fn merge(contributions: Contributions) -> (MergedPatch, MergedHaltRequests) {
    let mut data = Map::new();
    for section in contributions.data {
        overwrite(&mut data, section, "data");
    }

    let mut exceptions = Map::new();
    for section in contributions.exceptions {
        overwrite(&mut exceptions, section, "exception");
    }

    (MergedPatch(data), MergedHaltRequests(exceptions))
}

fn overwrite(acc: &mut Map<String, Value>, section: Map<String, Value>, what: &str) {
    for (key, value) in section {
        if let Some(previous) = acc.get(&key) {
            if *previous != value {
                debug!(key = %key, section = what, "Later subscriber overrides key");
            }
        }
        acc.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn section(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn last_subscriber_wins_per_key() {
        let contributions = Contributions {
            data: vec![
                section(json!({"mode": "audit", "course_key": "course-v1:a+b+c"})),
                section(json!({"mode": "verified"})),
            ],
            exceptions: vec![],
        };

        let (patch, halts) = merge(contributions);
        assert_eq!(patch.get_str("mode"), Some("verified"));
        assert_eq!(patch.get_str("course_key"), Some("course-v1:a+b+c"));
        assert!(halts.is_empty());
    }

    #[test]
    fn nested_objects_are_replaced_not_deep_merged() {
        let contributions = Contributions {
            data: vec![
                section(json!({"user": {"first_name": "Ana", "last_name": "Diaz"}})),
                section(json!({"user": {"first_name": "Eva"}})),
            ],
            exceptions: vec![],
        };

        let (patch, _) = merge(contributions);
        assert_eq!(patch.get("user"), Some(&json!({"first_name": "Eva"})));
    }

    #[test]
    fn merge_order_is_contribution_order() {
        let a = section(json!({"k": 1}));
        let b = section(json!({"k": 2}));

        let (forward, _) = merge(Contributions {
            data: vec![a.clone(), b.clone()],
            exceptions: vec![],
        });
        let (reverse, _) = merge(Contributions {
            data: vec![b, a],
            exceptions: vec![],
        });

        assert_eq!(forward.get("k"), Some(&json!(2)));
        assert_eq!(reverse.get("k"), Some(&json!(1)));
    }

    #[test]
    fn exceptions_merge_independently() {
        let contributions = Contributions {
            data: vec![],
            exceptions: vec![
                section(json!({"PreventLogin": "first"})),
                section(json!({"PreventLogin": "second", "RedirectToPage": "/x"})),
            ],
        };
        let (patch, halts) = merge(contributions);
        assert!(patch.is_empty());
        assert_eq!(halts.get("PreventLogin"), Some(&json!("second")));
        assert_eq!(halts.names().count(), 2);
    }
}
