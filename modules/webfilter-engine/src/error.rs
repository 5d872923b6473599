use thiserror::Error;

use crate::halt::HaltSignal;

pub type FilterResult<T> = std::result::Result<T, FilterError>;

#[derive(Debug, Error)]
pub enum FilterError {
    /// A subscriber stopped the host operation.
    #[error(transparent)]
    Halt(#[from] HaltSignal),

    /// A patched value is outside the vocabulary the host accepts.
    #[error("'{value}' is not a valid {field}. Valid options are: {allowed}")]
    Validation {
        field: String,
        value: String,
        allowed: String,
    },

    #[error("Failed to persist {entity}: {source}")]
    Persist {
        entity: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl FilterError {
    pub fn validation(field: impl Into<String>, value: impl Into<String>, allowed: &[&str]) -> Self {
        FilterError::Validation {
            field: field.into(),
            value: value.into(),
            allowed: allowed.join(", "),
        }
    }

    pub fn as_halt(&self) -> Option<&HaltSignal> {
        match self {
            FilterError::Halt(signal) => Some(signal),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::halt::HaltKind;

    #[test]
    fn halts_display_transparently() {
        let err: FilterError = HaltSignal::new(HaltKind::PreventLogin, "locked").into();
        assert_eq!(err.to_string(), "PreventLogin: locked");
        assert_eq!(err.as_halt().map(|h| h.kind), Some(HaltKind::PreventLogin));
    }

    #[test]
    fn validation_lists_allowed_values() {
        let err = FilterError::validation("gender", "x", &["m", "f", "o"]);
        assert_eq!(err.to_string(), "'x' is not a valid gender. Valid options are: m, f, o");
        assert!(err.as_halt().is_none());
    }
}
