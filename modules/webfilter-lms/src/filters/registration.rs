use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{error, info};
use webfilter_engine::{FilterEngine, FilterError, FilterResult, HaltKind, QueryForm};

use super::{EventSpec, WebFilter};
use crate::models::{GENDER_CHOICES, LEVEL_OF_EDUCATION_CHOICES};

/// A visitor submitted the registration form. Every form field is its own
/// context entry; subscribers send edits back under `form_data`.
pub struct StudentRegistrationRequested;

#[async_trait]
impl WebFilter for StudentRegistrationRequested {
    type Input = QueryForm;

    const SPEC: EventSpec = EventSpec {
        name: "StudentRegistrationRequested",
        primary: HaltKind::PreventRegistration,
        halts: &[HaltKind::PreventRegistration],
    };

    async fn run_filter(&self, engine: &FilterEngine, form: &mut QueryForm) -> FilterResult<()> {
        let spec = Self::SPEC;
        info!(event = spec.name, fields = ?form.keys().collect::<Vec<_>>(), "Running webhook filter");

        let exchange = {
            let ctx = form.to_context();
            engine.exchange(spec.name, &ctx, spec.primary).await?
        };

        match exchange.patch.get("form_data") {
            Some(Value::Object(form_data)) => {
                validate(form_data)?;
                form.replace_from(form_data, engine.serializer());
            }
            Some(other) => {
                error!(event = spec.name, value = %other, "form_data is not an object, ignoring it")
            }
            None => {}
        }

        FilterEngine::check_halt(&exchange.halts, spec.halts)
    }
}

fn describe(choices: &[(&str, &str)]) -> String {
    choices
        .iter()
        .map(|(code, label)| format!("{code}: {label}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn check_choice(form_data: &Map<String, Value>, field: &str, label: &str, choices: &[(&str, &str)]) -> FilterResult<()> {
    let Some(value) = form_data.get(field) else {
        return Ok(());
    };
    let valid = value
        .as_str()
        .is_some_and(|v| choices.iter().any(|(code, _)| *code == v));
    if valid {
        return Ok(());
    }
    Err(FilterError::Validation {
        field: label.to_string(),
        value: display(value),
        allowed: describe(choices),
    })
}

/// Reject subscriber edits the registration form cannot hold.
pub(crate) fn validate(form_data: &Map<String, Value>) -> FilterResult<()> {
    check_choice(form_data, "level_of_education", "level of education", LEVEL_OF_EDUCATION_CHOICES)?;
    check_choice(form_data, "gender", "gender", GENDER_CHOICES)?;

    if let Some(value) = form_data.get("terms_of_service") {
        let valid = match value {
            Value::Bool(_) => true,
            Value::String(s) => s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false"),
            _ => false,
        };
        if !valid {
            return Err(FilterError::validation(
                "terms of service value",
                display(value),
                &["true", "false"],
            ));
        }
    }
    Ok(())
}
