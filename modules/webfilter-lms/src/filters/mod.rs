//! One filter per learning-platform event.
//!
//! Each filter builds the event context, runs the exchange, applies the
//! sections it owns and finally raises the highest-priority halt the event
//! supports. Patches are applied before the halt check, so a subscriber can
//! both edit and veto in one response.

mod certificate;
mod cohort;
mod enrollment;
mod login;
mod registration;

pub use certificate::CertificateRenderStarted;
pub use cohort::CohortChangeRequested;
pub use enrollment::{CourseEnrollmentStarted, CourseUnenrollmentStarted, EnrollmentRequest};
pub use login::StudentLoginRequested;
pub use registration::StudentRegistrationRequested;

use async_trait::async_trait;
use webfilter_engine::{FilterEngine, FilterResult, HaltKind, MergedPatch};

use crate::models::User;

/// An event name with the halts it can raise, in priority order. `primary`
/// is the kind used when a subscriber's own failure policy halts the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSpec {
    pub name: &'static str,
    pub primary: HaltKind,
    pub halts: &'static [HaltKind],
}

pub const EVENTS: &[EventSpec] = &[
    StudentLoginRequested::SPEC,
    StudentRegistrationRequested::SPEC,
    CourseEnrollmentStarted::SPEC,
    CourseUnenrollmentStarted::SPEC,
    CohortChangeRequested::SPEC,
    CertificateRenderStarted::SPEC,
];

pub fn event_spec(name: &str) -> Option<&'static EventSpec> {
    EVENTS.iter().find(|spec| spec.name == name)
}

#[async_trait]
pub trait WebFilter: Send + Sync {
    type Input: Send;

    const SPEC: EventSpec;

    async fn run_filter(&self, engine: &FilterEngine, input: &mut Self::Input) -> FilterResult<()>;
}

/// Apply the `user` and `profile` sections most filters share.
async fn apply_user_sections(engine: &FilterEngine, user: &mut User, patch: &MergedPatch) -> FilterResult<()> {
    engine.apply(user, patch.get("user")).await?;
    engine.apply(&mut user.profile, patch.get("profile")).await?;
    Ok(())
}
