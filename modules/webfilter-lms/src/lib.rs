//! Learning-platform events wired to the webhook filter engine.
//!
//! `models` holds the live objects subscribers see and patch; `filters` holds
//! one filter per event, each with its own halt vocabulary.

pub mod filters;
pub mod models;

pub use filters::{
    event_spec, CertificateRenderStarted, CohortChangeRequested, CourseEnrollmentStarted,
    CourseUnenrollmentStarted, EnrollmentRequest, EventSpec, StudentLoginRequested,
    StudentRegistrationRequested, WebFilter, EVENTS,
};
pub use models::{
    CertificateRender, CohortChange, CohortMembership, CourseEnrollment, CourseKey,
    CourseUserGroup, InvalidKeyError, User, UserProfile,
};
