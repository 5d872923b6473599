//! Multi-value request forms.
//!
//! A form maps each key to a list of values. A plain update would append to
//! those lists; a subscriber patch must replace them, so `replace_from` sets
//! each patched key's list wholesale. The kind of the value a key currently
//! holds decides how the incoming JSON is coerced.

use serde_json::{Map, Value};
use tracing::warn;

use crate::patch::{coerce, ApplyReport, FieldKind, FieldValue, SkipReason};
use crate::payload::{EventContext, Inspect, PayloadSerializer, View};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryForm {
    entries: Vec<(String, Vec<FieldValue>)>,
}

impl QueryForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.append(key, value);
        self
    }

    /// Add a value to `key`'s list.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Replace `key`'s list.
    pub fn set_list(&mut self, key: impl Into<String>, values: Vec<FieldValue>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((key, values)),
        }
    }

    /// Last value for `key`.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.get_list(key).last()
    }

    pub fn get_list(&self, key: &str) -> &[FieldValue] {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overwrite each patched key's value list. A JSON array becomes the new
    /// list; anything else becomes a one-element list. Keys whose values do
    /// not coerce are left untouched, and so are keys `serializer` treats as
    /// sensitive.
    pub fn replace_from(
        &mut self,
        patch: &Map<String, Value>,
        serializer: &PayloadSerializer,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();

        for (key, value) in patch {
            if serializer.is_sensitive(key) {
                warn!(field = %key, "Refusing to patch sensitive form field");
                report.skipped.push((key.clone(), SkipReason::Sensitive));
                continue;
            }

            let kind = self
                .get(key)
                .and_then(FieldValue::kind)
                .unwrap_or(FieldKind::Text);

            let incoming: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                single => vec![single],
            };

            match incoming
                .into_iter()
                .map(|v| coerce(kind, true, v))
                .collect::<Result<Vec<_>, _>>()
            {
                Ok(values) => {
                    self.set_list(key.clone(), values);
                    report.applied.push(key.clone());
                }
                Err(e) => {
                    warn!(field = %key, error = %e, "Rejected form value, skipping");
                    report.skipped.push((key.clone(), SkipReason::Rejected(e)));
                }
            }
        }

        report
    }

    /// One context entry per key, for events whose context is the form
    /// itself.
    pub fn to_context(&self) -> EventContext<'_> {
        let mut ctx = EventContext::new();
        for (key, value) in self.inspect_entries() {
            ctx.insert(key, value);
        }
        ctx
    }

    // Single values go out as scalars, repeated keys as lists.
    fn inspect_entries(&self) -> impl Iterator<Item = (&str, &dyn Inspect)> {
        self.entries.iter().map(|(k, values)| {
            let value: &dyn Inspect = match values.as_slice() {
                [single] => single,
                _ => values,
            };
            (k.as_str(), value)
        })
    }
}

impl Inspect for QueryForm {
    fn view(&self) -> View<'_> {
        View::Fields(self.inspect_entries().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn replace(form: &mut QueryForm, value: Value) -> ApplyReport {
        form.replace_from(&patch(value), &PayloadSerializer::default())
    }

    #[test]
    fn replace_does_not_append() {
        let mut form = QueryForm::new()
            .with("goals", "learn")
            .with("goals", "teach");

        replace(&mut form, json!({"goals": "nothing"}));
        assert_eq!(form.get_list("goals"), &[FieldValue::from("nothing")]);
    }

    #[test]
    fn arrays_become_the_new_list() {
        let mut form = QueryForm::new().with("tags", "a");
        replace(&mut form, json!({"tags": ["b", "c"]}));
        assert_eq!(
            form.get_list("tags"),
            &[FieldValue::from("b"), FieldValue::from("c")]
        );
    }

    #[test]
    fn current_kind_drives_coercion() {
        let mut form = QueryForm::new()
            .with("terms_of_service", false)
            .with("year_of_birth", 1990i64);

        let report = replace(
            &mut form,
            json!({
                "terms_of_service": "TRUE",
                "year_of_birth": "1985",
                "city": "Quito",
            }),
        );

        assert_eq!(form.get("terms_of_service"), Some(&FieldValue::Boolean(true)));
        assert_eq!(form.get("year_of_birth"), Some(&FieldValue::Integer(1985)));
        assert_eq!(form.get("city"), Some(&FieldValue::from("Quito")));
        assert_eq!(report.applied.len(), 3);
    }

    #[test]
    fn rejected_values_leave_key_untouched() {
        let mut form = QueryForm::new().with("terms_of_service", true);
        let report = replace(&mut form, json!({"terms_of_service": "maybe"}));
        assert_eq!(form.get("terms_of_service"), Some(&FieldValue::Boolean(true)));
        assert!(!report.changed());
    }

    #[test]
    fn password_is_neither_sent_nor_patched() {
        let mut form = QueryForm::new()
            .with("username", "andres")
            .with("password", "s3cret");

        let report = replace(&mut form, json!({"password": "other"}));
        assert_eq!(form.get("password"), Some(&FieldValue::from("s3cret")));
        assert_eq!(report.skipped_reason("password"), Some(&SkipReason::Sensitive));

        let out = PayloadSerializer::default().serialize(&form);
        assert_eq!(out, json!({"username": "andres"}));
    }

    #[test]
    fn configured_sensitive_fields_are_refused() {
        let serializer = PayloadSerializer::new(10, Vec::new(), vec!["ssn".to_string()]);
        let mut form = QueryForm::new()
            .with("username", "andres")
            .with("ssn", "123-45-6789");

        let report = form.replace_from(
            &patch(json!({"ssn": "999-99-9999", "username": "andy"})),
            &serializer,
        );
        assert_eq!(form.get("ssn"), Some(&FieldValue::from("123-45-6789")));
        assert_eq!(form.get("username"), Some(&FieldValue::from("andy")));
        assert_eq!(report.skipped_reason("ssn"), Some(&SkipReason::Sensitive));
        assert_eq!(serializer.serialize(&form), json!({"username": "andy"}));
    }

    #[test]
    fn context_has_one_entry_per_key() {
        let form = QueryForm::new()
            .with("email", "a@example.com")
            .with("password", "s3cret")
            .with("tags", "a")
            .with("tags", "b");
        let payload = PayloadSerializer::default().serialize_context(&form.to_context());
        assert_eq!(
            Value::Object(payload),
            json!({"email": "a@example.com", "tags": ["a", "b"]})
        );
    }

    #[test]
    fn multi_valued_keys_serialize_as_lists() {
        let form = QueryForm::new().with("tags", "a").with("tags", "b");
        let out = PayloadSerializer::default().serialize(&form);
        assert_eq!(out, json!({"tags": ["a", "b"]}));
    }
}
