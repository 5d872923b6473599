use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};
use webfilter_engine::{EventContext, FilterEngine, FilterError, FilterResult, HaltKind};

use super::{apply_user_sections, EventSpec, WebFilter};
use crate::models::{CourseEnrollment, CourseKey, User};

/// A learner asked to enroll in a course with a given mode.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentRequest {
    pub user: User,
    pub course_key: CourseKey,
    pub mode: String,
}

/// Subscribers may edit the user and profile, move the enrollment to another
/// course (`course_key`) or change its `mode`.
pub struct CourseEnrollmentStarted;

#[async_trait]
impl WebFilter for CourseEnrollmentStarted {
    type Input = EnrollmentRequest;

    const SPEC: EventSpec = EventSpec {
        name: "CourseEnrollmentStarted",
        primary: HaltKind::PreventEnrollment,
        halts: &[HaltKind::PreventEnrollment],
    };

    async fn run_filter(&self, engine: &FilterEngine, request: &mut EnrollmentRequest) -> FilterResult<()> {
        let spec = Self::SPEC;
        info!(
            event = spec.name,
            user = %request.user.username,
            course = %request.course_key,
            mode = %request.mode,
            "Running webhook filter"
        );

        let exchange = {
            let ctx = EventContext::new()
                .with("user", &request.user)
                .with("profile", &request.user.profile)
                .with("course_key", &request.course_key)
                .with("mode", &request.mode);
            engine.exchange(spec.name, &ctx, spec.primary).await?
        };

        apply_user_sections(engine, &mut request.user, &exchange.patch).await?;

        if let Some(value) = exchange.patch.get("course_key") {
            request.course_key = parse_course_key(value)?;
            info!(event = spec.name, course = %request.course_key, "Course key replaced by subscriber");
        }
        match exchange.patch.get("mode") {
            Some(Value::String(mode)) => request.mode = mode.clone(),
            Some(other) => warn!(event = spec.name, value = %other, "Ignoring non-string mode"),
            None => {}
        }

        FilterEngine::check_halt(&exchange.halts, spec.halts)
    }
}

fn parse_course_key(value: &Value) -> FilterResult<CourseKey> {
    let invalid = |shown: String| FilterError::Validation {
        field: "course key".to_string(),
        value: shown,
        allowed: "course-v1:{org}+{course}+{run}".to_string(),
    };
    match value {
        Value::String(s) => s.parse().map_err(|_| invalid(s.clone())),
        other => Err(invalid(other.to_string())),
    }
}

/// A learner is leaving a course. Subscribers may edit the user and profile.
pub struct CourseUnenrollmentStarted;

#[async_trait]
impl WebFilter for CourseUnenrollmentStarted {
    type Input = CourseEnrollment;

    const SPEC: EventSpec = EventSpec {
        name: "CourseUnenrollmentStarted",
        primary: HaltKind::PreventUnenrollment,
        halts: &[HaltKind::PreventUnenrollment],
    };

    async fn run_filter(&self, engine: &FilterEngine, enrollment: &mut CourseEnrollment) -> FilterResult<()> {
        let spec = Self::SPEC;
        info!(
            event = spec.name,
            enrollment = enrollment.id,
            course = %enrollment.course_id,
            "Running webhook filter"
        );

        let exchange = {
            let ctx = EventContext::new()
                .with("user", &enrollment.user)
                .with("profile", &enrollment.user.profile)
                .with("enrollment", &*enrollment);
            engine.exchange(spec.name, &ctx, spec.primary).await?
        };

        apply_user_sections(engine, &mut enrollment.user, &exchange.patch).await?;

        FilterEngine::check_halt(&exchange.halts, spec.halts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn course_key_must_parse() {
        assert_eq!(
            parse_course_key(&json!("course-v1:a+b+c")).unwrap().to_string(),
            "course-v1:a+b+c"
        );
        assert!(matches!(
            parse_course_key(&json!("nonsense")),
            Err(FilterError::Validation { .. })
        ));
        assert!(parse_course_key(&json!(12)).is_err());
    }
}
