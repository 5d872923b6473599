use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;
use webfilter_engine::{Inspect, View};

use super::User;

const COURSE_PREFIX: &str = "course-v1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid course key: {0:?}")]
pub struct InvalidKeyError(pub String);

/// Opaque course identifier, `course-v1:{org}+{course}+{run}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CourseKey {
    pub org: String,
    pub course: String,
    pub run: String,
}

impl CourseKey {
    pub fn new(org: &str, course: &str, run: &str) -> Result<Self, InvalidKeyError> {
        let key = Self {
            org: org.to_string(),
            course: course.to_string(),
            run: run.to_string(),
        };
        if [org, course, run].iter().all(|part| valid_part(part)) {
            Ok(key)
        } else {
            Err(InvalidKeyError(key.to_string()))
        }
    }
}

fn valid_part(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '%'))
}

impl FromStr for CourseKey {
    type Err = InvalidKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidKeyError(s.to_string());
        let rest = s
            .strip_prefix(COURSE_PREFIX)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(invalid)?;

        let mut parts = rest.split('+');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(org), Some(course), Some(run), None) => {
                CourseKey::new(org, course, run).map_err(|_| invalid())
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{COURSE_PREFIX}:{}+{}+{}", self.org, self.course, self.run)
    }
}

impl Inspect for CourseKey {
    fn view(&self) -> View<'_> {
        View::Key(self.to_string())
    }
}

/// A learner's seat in a course.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseEnrollment {
    pub id: i64,
    pub user: User,
    pub course_id: CourseKey,
    pub mode: String,
    pub is_active: bool,
    pub created: DateTime<Utc>,
}

impl Inspect for CourseEnrollment {
    fn view(&self) -> View<'_> {
        View::Fields(vec![
            ("id", &self.id as &dyn Inspect),
            ("user", &self.user),
            ("course_id", &self.course_id),
            ("mode", &self.mode),
            ("is_active", &self.is_active),
            ("created", &self.created),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let key: CourseKey = "course-v1:edX+DemoX+2024_T1".parse().unwrap();
        assert_eq!(key.org, "edX");
        assert_eq!(key.course, "DemoX");
        assert_eq!(key.run, "2024_T1");
        assert_eq!(key.to_string(), "course-v1:edX+DemoX+2024_T1");
    }

    #[test]
    fn rejects_malformed_keys() {
        for bad in [
            "",
            "course-v1:",
            "course-v1:a+b",
            "course-v1:a+b+c+d",
            "course-v1:a++c",
            "block-v1:a+b+c",
            "edX/DemoX/2024",
            "course-v1:a b+c+d",
        ] {
            assert!(bad.parse::<CourseKey>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn serializes_as_canonical_string() {
        let key = CourseKey::new("test", "test", "test").unwrap();
        let out = webfilter_engine::PayloadSerializer::default().serialize(&key);
        assert_eq!(out, serde_json::json!("course-v1:test+test+test"));
    }
}
