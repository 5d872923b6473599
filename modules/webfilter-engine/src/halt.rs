//! Halt signals: the one intentional way a subscriber can stop an event.
//!
//! Subscribers name the halt they want in their `exception` section. Names are
//! matched against a closed table; anything not in the table is logged and
//! ignored. Each event declares which kinds it supports, in priority order, and
//! at most one signal is ever built per dispatch.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::merge::MergedHaltRequests;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HaltKind {
    PreventLogin,
    PreventRegistration,
    PreventEnrollment,
    PreventUnenrollment,
    PreventCohortChange,
    RedirectToPage,
    RenderAlternativeInvalidCertificate,
    /// Replaces the host's response wholesale.
    RenderCustomResponse,
}

impl HaltKind {
    pub const ALL: [HaltKind; 8] = [
        HaltKind::PreventLogin,
        HaltKind::PreventRegistration,
        HaltKind::PreventEnrollment,
        HaltKind::PreventUnenrollment,
        HaltKind::PreventCohortChange,
        HaltKind::RedirectToPage,
        HaltKind::RenderAlternativeInvalidCertificate,
        HaltKind::RenderCustomResponse,
    ];

    /// Name subscribers use as the key in their `exception` section.
    pub fn name(self) -> &'static str {
        match self {
            HaltKind::PreventLogin => "PreventLogin",
            HaltKind::PreventRegistration => "PreventRegistration",
            HaltKind::PreventEnrollment => "PreventEnrollment",
            HaltKind::PreventUnenrollment => "PreventUnenrollment",
            HaltKind::PreventCohortChange => "PreventCohortChange",
            HaltKind::RedirectToPage => "RedirectToPage",
            HaltKind::RenderAlternativeInvalidCertificate => "RenderAlternativeInvalidCertificate",
            HaltKind::RenderCustomResponse => "RenderCustomResponse",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn replaces_response(self) -> bool {
        matches!(self, HaltKind::RenderCustomResponse)
    }
}

impl fmt::Display for HaltKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Full response a `RenderCustomResponse` halt puts in place of the host's.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplacementResponse {
    pub status_code: u16,
    pub content: String,
    pub headers: BTreeMap<String, String>,
    pub content_type: String,
}

impl Default for ReplacementResponse {
    fn default() -> Self {
        Self {
            status_code: 200,
            content: String::new(),
            headers: BTreeMap::new(),
            content_type: "text/html; charset=utf-8".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct HaltSignal {
    pub kind: HaltKind,
    pub message: String,
    pub redirect_to: Option<String>,
    pub error_code: Option<String>,
    pub status_code: Option<u16>,
    pub template: Option<String>,
    pub context: Map<String, Value>,
    pub response: Option<ReplacementResponse>,
}

impl HaltSignal {
    pub fn new(kind: HaltKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            redirect_to: None,
            error_code: None,
            status_code: None,
            template: None,
            context: Map::new(),
            response: None,
        }
    }

    pub fn with_redirect(mut self, redirect_to: Option<String>) -> Self {
        self.redirect_to = redirect_to;
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    fn replacing(kind: HaltKind, message: String, response: ReplacementResponse) -> Self {
        Self {
            response: Some(response),
            ..Self::new(kind, message)
        }
    }

    /// Build a signal of `kind` from one subscriber-supplied settings value.
    pub fn from_request(kind: HaltKind, settings: &Value) -> Self {
        if kind.replaces_response() {
            return replacement_signal(kind, settings);
        }
        match settings {
            Value::String(message) => HaltSignal::new(kind, message.clone()),
            Value::Object(fields) => structured_signal(kind, fields),
            _ => HaltSignal::new(kind, "Reason not specified"),
        }
    }
}

const SIGNAL_KEYS: &[&str] = &[
    "message",
    "redirect_to",
    "error_code",
    "status_code",
    "template",
    "context",
];

fn structured_signal(kind: HaltKind, fields: &Map<String, Value>) -> HaltSignal {
    let unknown: Vec<&str> = fields
        .keys()
        .map(String::as_str)
        .filter(|k| !SIGNAL_KEYS.contains(k))
        .collect();
    if !unknown.is_empty() {
        warn!(halt = %kind, ?unknown, "Ignoring unrecognized halt settings");
    }

    HaltSignal {
        kind,
        message: str_field(fields, "message").unwrap_or_default(),
        redirect_to: str_field(fields, "redirect_to"),
        error_code: match fields.get("error_code") {
            Some(Value::String(code)) => Some(code.clone()),
            Some(Value::Number(code)) => Some(code.to_string()),
            _ => None,
        },
        status_code: status_field(fields),
        template: str_field(fields, "template"),
        context: fields
            .get("context")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        response: None,
    }
}

fn replacement_signal(kind: HaltKind, settings: &Value) -> HaltSignal {
    let fields = match settings {
        Value::String(content) => {
            let response = ReplacementResponse {
                content: content.clone(),
                ..ReplacementResponse::default()
            };
            return HaltSignal::replacing(kind, String::new(), response);
        }
        Value::Object(fields) => fields,
        _ => return HaltSignal::replacing(kind, String::new(), ReplacementResponse::default()),
    };

    // The response may be nested under "response" or given inline.
    let source = fields
        .get("response")
        .and_then(Value::as_object)
        .unwrap_or(fields);

    let defaults = ReplacementResponse::default();
    let response = ReplacementResponse {
        status_code: status_field(source).unwrap_or(defaults.status_code),
        content: match source.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
        headers: source
            .get("headers")
            .and_then(Value::as_object)
            .map(|h| {
                h.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default(),
        content_type: str_field(source, "content_type").unwrap_or(defaults.content_type),
    };

    HaltSignal::replacing(
        kind,
        str_field(fields, "message").unwrap_or_default(),
        response,
    )
}

fn str_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

fn status_field(fields: &Map<String, Value>) -> Option<u16> {
    fields
        .get("status_code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
}

/// Pick the halt to raise, if any.
///
/// `supported` is the event's halt vocabulary in priority order; the first
/// kind with a matching request wins no matter which subscriber asked first.
pub fn reconstruct(requests: &MergedHaltRequests, supported: &[HaltKind]) -> Option<HaltSignal> {
    for name in requests.names() {
        match HaltKind::from_name(name) {
            None => warn!(name, "Ignoring unrecognized halt request"),
            Some(kind) if !supported.contains(&kind) => {
                debug!(halt = %kind, "Halt not supported by this event")
            }
            Some(_) => {}
        }
    }

    supported.iter().find_map(|kind| {
        requests
            .get(kind.name())
            .map(|settings| HaltSignal::from_request(*kind, settings))
    })
}
