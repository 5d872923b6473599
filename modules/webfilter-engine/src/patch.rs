//! Applying a merged patch onto live domain objects.
//!
//! Every patchable type publishes a static field registry: field name, a getter
//! and a setter whose variant is the field's declared kind. Incoming JSON is
//! coerced according to that kind (ISO-8601 strings for timestamps,
//! case-insensitive `"true"`/`"false"` for booleans). Unknown fields and values
//! that do not coerce are logged and skipped; the identity field and
//! credentials are never written.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::payload::{Inspect, PayloadSerializer, View};

pub const IDENTITY_FIELD: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Boolean,
    Integer,
    Timestamp,
}

/// A field value as the applier sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Boolean(bool),
    Integer(i64),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Kind of the value currently held; `None` for `Null`.
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(_) => Some(FieldKind::Text),
            FieldValue::Boolean(_) => Some(FieldKind::Boolean),
            FieldValue::Integer(_) => Some(FieldKind::Integer),
            FieldValue::Timestamp(_) => Some(FieldKind::Timestamp),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Inspect for FieldValue {
    fn view(&self) -> View<'_> {
        View::Value(self.to_json())
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoerceError {
    #[error("expected an ISO-8601 timestamp, got {0}")]
    Timestamp(String),
    #[error("expected true or false, got {0}")]
    Boolean(String),
    #[error("expected an integer, got {0}")]
    Integer(String),
    #[error("expected text, got {0}")]
    Text(String),
    #[error("field cannot be null")]
    Null,
}

/// Parse the ISO-8601 shapes subscribers send back: RFC 3339, the
/// space-separated form the payload used to carry, naive datetimes (taken as
/// UTC) and bare dates.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn coerce_text(value: &Value) -> Result<String, CoerceError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(CoerceError::Text(other.to_string())),
    }
}

fn coerce_bool(value: &Value) -> Result<bool, CoerceError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(CoerceError::Boolean(other.to_string())),
    }
}

fn coerce_integer(value: &Value) -> Result<i64, CoerceError> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| CoerceError::Integer(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| CoerceError::Integer(s.clone())),
        other => Err(CoerceError::Integer(other.to_string())),
    }
}

fn coerce_timestamp(value: &Value) -> Result<DateTime<Utc>, CoerceError> {
    match value {
        Value::String(s) => parse_timestamp(s).ok_or_else(|| CoerceError::Timestamp(s.clone())),
        other => Err(CoerceError::Timestamp(other.to_string())),
    }
}

fn nullable<T>(
    value: &Value,
    coerce: fn(&Value) -> Result<T, CoerceError>,
) -> Result<Option<T>, CoerceError> {
    match value {
        Value::Null => Ok(None),
        other => coerce(other).map(Some),
    }
}

/// Coerce untrusted JSON into a value of `kind`.
pub fn coerce(kind: FieldKind, allow_null: bool, value: &Value) -> Result<FieldValue, CoerceError> {
    if value.is_null() {
        return if allow_null {
            Ok(FieldValue::Null)
        } else {
            Err(CoerceError::Null)
        };
    }
    match kind {
        FieldKind::Text => coerce_text(value).map(FieldValue::Text),
        FieldKind::Boolean => coerce_bool(value).map(FieldValue::Boolean),
        FieldKind::Integer => coerce_integer(value).map(FieldValue::Integer),
        FieldKind::Timestamp => coerce_timestamp(value).map(FieldValue::Timestamp),
    }
}

/// Typed setter. The variant is the field's declared kind.
pub enum Setter<T> {
    Text(fn(&mut T, String)),
    OptionalText(fn(&mut T, Option<String>)),
    Boolean(fn(&mut T, bool)),
    Integer(fn(&mut T, i64)),
    OptionalInteger(fn(&mut T, Option<i64>)),
    Timestamp(fn(&mut T, DateTime<Utc>)),
    OptionalTimestamp(fn(&mut T, Option<DateTime<Utc>>)),
}

impl<T> Setter<T> {
    pub fn kind(&self) -> FieldKind {
        match self {
            Setter::Text(_) | Setter::OptionalText(_) => FieldKind::Text,
            Setter::Boolean(_) => FieldKind::Boolean,
            Setter::Integer(_) | Setter::OptionalInteger(_) => FieldKind::Integer,
            Setter::Timestamp(_) | Setter::OptionalTimestamp(_) => FieldKind::Timestamp,
        }
    }

    /// Coerce `value` and write it. Nothing is written on error.
    pub fn apply(&self, target: &mut T, value: &Value) -> Result<(), CoerceError> {
        match self {
            Setter::Text(set) => set(target, required(value, coerce_text)?),
            Setter::OptionalText(set) => set(target, nullable(value, coerce_text)?),
            Setter::Boolean(set) => set(target, required(value, coerce_bool)?),
            Setter::Integer(set) => set(target, required(value, coerce_integer)?),
            Setter::OptionalInteger(set) => set(target, nullable(value, coerce_integer)?),
            Setter::Timestamp(set) => set(target, required(value, coerce_timestamp)?),
            Setter::OptionalTimestamp(set) => set(target, nullable(value, coerce_timestamp)?),
        }
        Ok(())
    }
}

fn required<T>(
    value: &Value,
    coerce: fn(&Value) -> Result<T, CoerceError>,
) -> Result<T, CoerceError> {
    nullable(value, coerce)?.ok_or(CoerceError::Null)
}

pub struct Field<T> {
    pub name: &'static str,
    pub get: fn(&T) -> FieldValue,
    pub set: Setter<T>,
}

/// Registry entry for a struct field of the same name, e.g.
/// `patch_field!(city: OptionalText)`.
#[macro_export]
macro_rules! patch_field {
    ($name:ident : $kind:ident) => {
        $crate::Field {
            name: stringify!($name),
            get: |target| target.$name.clone().into(),
            set: $crate::Setter::$kind(|target, value| target.$name = value),
        }
    };
}

/// A live domain object subscribers may patch.
pub trait Patchable: Send + Sync + Sized + 'static {
    /// Entity name used in logs and by the persistence seam.
    const ENTITY: &'static str;

    fn fields() -> &'static [Field<Self>];

    fn identity(&self) -> i64;

    fn field(name: &str) -> Option<&'static Field<Self>> {
        Self::fields().iter().find(|f| f.name == name)
    }

    fn get(&self, name: &str) -> Option<FieldValue> {
        Self::field(name).map(|f| (f.get)(self))
    }

    /// Identity plus every registered field, for persistence.
    fn snapshot(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(IDENTITY_FIELD.to_string(), Value::from(self.identity()));
        for field in Self::fields() {
            map.insert(field.name.to_string(), (field.get)(self).to_json());
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Identity,
    Sensitive,
    UnknownField,
    Rejected(CoerceError),
}

/// What happened to each key of a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
}

impl ApplyReport {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }

    pub fn skipped_reason(&self, field: &str) -> Option<&SkipReason> {
        self.skipped.iter().find(|(f, _)| f == field).map(|(_, r)| r)
    }
}

/// Apply `patch` onto `target` field by field. Keys `serializer` treats as
/// sensitive are refused.
pub fn apply<T: Patchable>(
    target: &mut T,
    patch: &Map<String, Value>,
    serializer: &PayloadSerializer,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    for (key, value) in patch {
        if key == IDENTITY_FIELD {
            info!(entity = T::ENTITY, id = target.identity(), "Refusing to change identity field");
            report.skipped.push((key.clone(), SkipReason::Identity));
            continue;
        }
        if serializer.is_sensitive(key) {
            warn!(entity = T::ENTITY, field = %key, "Refusing to patch sensitive field");
            report.skipped.push((key.clone(), SkipReason::Sensitive));
            continue;
        }
        let Some(field) = T::field(key) else {
            warn!(entity = T::ENTITY, field = %key, "Unknown field in patch, skipping");
            report.skipped.push((key.clone(), SkipReason::UnknownField));
            continue;
        };

        let previous = (field.get)(target);
        match field.set.apply(target, value) {
            Ok(()) => {
                debug!(
                    entity = T::ENTITY,
                    field = %key,
                    from = %previous.to_json(),
                    to = %(field.get)(target).to_json(),
                    "Updated field"
                );
                report.applied.push(key.clone());
            }
            Err(e) => {
                warn!(entity = T::ENTITY, field = %key, error = %e, "Rejected patch value, skipping");
                report.skipped.push((key.clone(), SkipReason::Rejected(e)));
            }
        }
    }

    report
}
