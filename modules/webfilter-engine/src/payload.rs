//! Event context serialization.
//!
//! Subscribers only ever see plain JSON. Anything the host wants to put in an
//! event context implements [`Inspect`], which describes the value's shape
//! without committing to an encoding; [`PayloadSerializer`] walks those shapes
//! into a `serde_json::Value` tree, dropping back-references, runtime handles and
//! credentials, and cutting off anything nested deeper than `max_depth`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

/// Nesting depth after which subtrees are replaced by a marker string.
pub const MAX_DEPTH: usize = 10;

/// Back-reference and runtime-context fields. They create cycles and mean
/// nothing to a subscriber.
pub const DEFAULT_EXCLUDED_FIELDS: &[&str] = &[
    "parent",
    "_parent",
    "runtime",
    "_runtime",
    "_state",
    "_field_data_cache",
];

/// Credentials never leave the process and are never accepted back.
pub const SENSITIVE_FIELDS: &[&str] = &["password"];

/// Shape of a value as seen by the serializer.
pub enum View<'a> {
    /// Already a JSON primitive (or a small tree the value owns outright).
    Value(Value),
    /// Opaque identifier (course key, locator) in its canonical string form.
    Key(String),
    /// Block scope identifier, serialized as a fixed four-field record.
    Scope(&'a ScopeId),
    Seq(Vec<&'a dyn Inspect>),
    Fields(Vec<(&'a str, &'a dyn Inspect)>),
    /// Unrecognized, but has a string form.
    Display(String),
    /// Unrecognized and has no string form.
    Opaque,
}

/// Anything that can appear in an event context.
pub trait Inspect: Send + Sync {
    fn view(&self) -> View<'_>;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Identifies one block as seen by one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeId {
    pub block_type: String,
    pub user_id: Option<i64>,
    pub def_id: String,
    pub usage_id: String,
}

impl Inspect for ScopeId {
    fn view(&self) -> View<'_> {
        View::Scope(self)
    }
}

/// The named values attached to one occurrence of a host event, in the order
/// the host listed them. Borrows the live objects for the duration of
/// serialization only.
#[derive(Default)]
pub struct EventContext<'a> {
    fields: Vec<(String, &'a dyn Inspect)>,
}

impl<'a> EventContext<'a> {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Add a named value. A second value under the same name replaces the first.
    pub fn with(mut self, name: impl Into<String>, value: &'a dyn Inspect) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: &'a dyn Inspect) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &'a dyn Inspect)> + '_ {
        self.fields.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PayloadSerializer {
    max_depth: usize,
    excluded: HashSet<String>,
    sensitive: HashSet<String>,
}

impl Default for PayloadSerializer {
    fn default() -> Self {
        Self::new(
            MAX_DEPTH,
            DEFAULT_EXCLUDED_FIELDS.iter().map(|s| s.to_string()),
            SENSITIVE_FIELDS.iter().map(|s| s.to_string()),
        )
    }
}

impl PayloadSerializer {
    /// `sensitive` is always extended with [`SENSITIVE_FIELDS`].
    pub fn new(
        max_depth: usize,
        excluded: impl IntoIterator<Item = String>,
        sensitive: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut sensitive: HashSet<String> = sensitive.into_iter().collect();
        sensitive.extend(SENSITIVE_FIELDS.iter().map(|s| s.to_string()));
        Self {
            max_depth,
            excluded: excluded.into_iter().collect(),
            sensitive,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Credentials: never sent, never accepted back from a patch.
    pub fn is_sensitive(&self, field: &str) -> bool {
        self.sensitive.contains(field)
    }

    /// Whether `field` is kept out of payloads.
    pub fn drops(&self, field: &str) -> bool {
        self.excluded.contains(field) || self.sensitive.contains(field)
    }

    /// Serialize a whole event context into the top-level payload object.
    pub fn serialize_context(&self, context: &EventContext<'_>) -> Map<String, Value> {
        context
            .iter()
            .filter(|(name, _)| !self.drops(name))
            .map(|(name, value)| (name.to_string(), self.serialize_at(value, 0)))
            .collect()
    }

    pub fn serialize(&self, value: &dyn Inspect) -> Value {
        self.serialize_at(value, 0)
    }

    pub fn serialize_at(&self, value: &dyn Inspect, depth: usize) -> Value {
        match value.view() {
            View::Value(v) => v,
            View::Key(key) => Value::String(key),
            View::Scope(scope) => json!({
                "block_type": scope.block_type,
                "def_id": scope.def_id,
                "usage_id": scope.usage_id,
                "user_id": scope.user_id,
            }),
            View::Display(s) => Value::String(s),
            View::Opaque => Value::String(format!("<unserializable {}>", value.type_name())),
            View::Seq(items) => {
                if depth >= self.max_depth {
                    return self.depth_marker(value);
                }
                Value::Array(
                    items
                        .into_iter()
                        .map(|item| self.serialize_at(item, depth + 1))
                        .collect(),
                )
            }
            View::Fields(fields) => {
                if depth >= self.max_depth {
                    return self.depth_marker(value);
                }
                Value::Object(
                    fields
                        .into_iter()
                        .filter(|(name, _)| !self.drops(name))
                        .map(|(name, field)| (name.to_string(), self.serialize_at(field, depth + 1)))
                        .collect(),
                )
            }
        }
    }

    fn depth_marker(&self, value: &dyn Inspect) -> Value {
        Value::String(format!(
            "<{} nested deeper than {} levels>",
            value.type_name(),
            self.max_depth
        ))
    }
}

// ---------------------------------------------------------------------------
// Inspect for std, chrono and serde_json values
// ---------------------------------------------------------------------------

macro_rules! inspect_as_json {
    ($($t:ty),* $(,)?) => {
        $(
            impl Inspect for $t {
                fn view(&self) -> View<'_> {
                    View::Value(Value::from(self.clone()))
                }
            }
        )*
    };
}

inspect_as_json!(bool, i32, i64, u16, u32, u64, f64, String);

impl Inspect for DateTime<Utc> {
    fn view(&self) -> View<'_> {
        View::Value(Value::String(self.to_rfc3339()))
    }
}

impl<T: Inspect> Inspect for Option<T> {
    fn view(&self) -> View<'_> {
        match self {
            Some(inner) => inner.view(),
            None => View::Value(Value::Null),
        }
    }
}

impl<T: Inspect> Inspect for Vec<T> {
    fn view(&self) -> View<'_> {
        View::Seq(self.iter().map(|item| item as &dyn Inspect).collect())
    }
}

impl<T: Inspect + ?Sized> Inspect for Arc<T> {
    fn view(&self) -> View<'_> {
        (**self).view()
    }

    fn type_name(&self) -> &'static str {
        (**self).type_name()
    }
}

impl Inspect for Value {
    fn view(&self) -> View<'_> {
        match self {
            Value::Array(items) => View::Seq(items.iter().map(|v| v as &dyn Inspect).collect()),
            Value::Object(map) => View::Fields(
                map.iter()
                    .map(|(k, v)| (k.as_str(), v as &dyn Inspect))
                    .collect(),
            ),
            primitive => View::Value(primitive.clone()),
        }
    }
}

impl Inspect for Map<String, Value> {
    fn view(&self) -> View<'_> {
        View::Fields(
            self.iter()
                .map(|(k, v)| (k.as_str(), v as &dyn Inspect))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::OnceLock;

    struct Node {
        name: String,
        next: OnceLock<Arc<Node>>,
        parent: OnceLock<Arc<Node>>,
    }

    impl Node {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                next: OnceLock::new(),
                parent: OnceLock::new(),
            })
        }
    }

    impl Inspect for Node {
        fn view(&self) -> View<'_> {
            let mut fields: Vec<(&str, &dyn Inspect)> = vec![("name", &self.name as &dyn Inspect)];
            if let Some(next) = self.next.get() {
                fields.push(("next", next as &dyn Inspect));
            }
            if let Some(parent) = self.parent.get() {
                fields.push(("parent", parent as &dyn Inspect));
            }
            View::Fields(fields)
        }
    }

    struct CourseKey(&'static str);

    impl Inspect for CourseKey {
        fn view(&self) -> View<'_> {
            View::Key(self.0.to_string())
        }
    }

    struct Locale;

    impl fmt::Display for Locale {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("es-419")
        }
    }

    impl Inspect for Locale {
        fn view(&self) -> View<'_> {
            View::Display(self.to_string())
        }
    }

    struct Socket;

    impl Inspect for Socket {
        fn view(&self) -> View<'_> {
            View::Opaque
        }
    }

    #[test]
    fn primitives_pass_through() {
        let s = PayloadSerializer::default();
        assert_eq!(s.serialize(&"honor".to_string()), json!("honor"));
        assert_eq!(s.serialize(&42i64), json!(42));
        assert_eq!(s.serialize(&true), json!(true));
        assert_eq!(s.serialize(&Option::<String>::None), Value::Null);
    }

    #[test]
    fn keys_and_scopes_have_canonical_forms() {
        let s = PayloadSerializer::default();
        assert_eq!(
            s.serialize(&CourseKey("course-v1:edX+DemoX+2024")),
            json!("course-v1:edX+DemoX+2024")
        );

        let scope = ScopeId {
            block_type: "problem".into(),
            user_id: Some(4),
            def_id: "def-1".into(),
            usage_id: "block-v1:edX+DemoX+2024+type@problem+block@p1".into(),
        };
        assert_eq!(
            s.serialize(&scope),
            json!({
                "block_type": "problem",
                "def_id": "def-1",
                "usage_id": "block-v1:edX+DemoX+2024+type@problem+block@p1",
                "user_id": 4,
            })
        );
    }

    #[test]
    fn unknown_values_fall_back_to_string_or_placeholder() {
        let s = PayloadSerializer::default();
        assert_eq!(s.serialize(&Locale), json!("es-419"));
        let placeholder = s.serialize(&Socket);
        assert!(placeholder.as_str().unwrap().contains("Socket"));
    }

    #[test]
    fn self_referential_graph_is_cut_at_max_depth() {
        let node = Node::new("loop");
        let _ = node.next.set(node.clone());

        let s = PayloadSerializer::default();
        let mut current = s.serialize(&node);
        let mut levels = 0;
        while let Value::Object(map) = current {
            assert_eq!(map["name"], "loop");
            current = map["next"].clone();
            levels += 1;
        }

        assert_eq!(levels, MAX_DEPTH);
        assert!(current.as_str().unwrap().contains("nested deeper than 10 levels"));
    }

    #[test]
    fn back_references_are_excluded() {
        let root = Node::new("root");
        let child = Node::new("child");
        let _ = child.parent.set(root.clone());

        let s = PayloadSerializer::default();
        assert_eq!(s.serialize(&child), json!({"name": "child"}));
    }

    #[test]
    fn context_drops_credentials_and_keeps_order() {
        let username = "andres".to_string();
        let password = "pbkdf2_sha256$secret".to_string();
        let mode = "honor".to_string();
        let context = EventContext::new()
            .with("username", &username)
            .with("password", &password)
            .with("mode", &mode);

        let payload = PayloadSerializer::default().serialize_context(&context);
        let keys: Vec<&str> = payload.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["username", "mode"]);
    }

    #[test]
    fn nested_json_credentials_are_dropped() {
        let user = json!({"id": 4, "password": "hash", "tags": ["a", {"password": "x"}]});
        let out = PayloadSerializer::default().serialize(&user);
        assert_eq!(out, json!({"id": 4, "tags": ["a", {}]}));
    }

    #[test]
    fn context_insert_replaces_same_name() {
        let a = "a".to_string();
        let b = "b".to_string();
        let context = EventContext::new().with("mode", &a).with("mode", &b);
        assert_eq!(context.len(), 1);
        let payload = PayloadSerializer::default().serialize_context(&context);
        assert_eq!(payload["mode"], "b");
    }
}
