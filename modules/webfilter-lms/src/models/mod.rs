mod certificate;
mod cohort;
mod course;
mod user;

pub use certificate::CertificateRender;
pub use cohort::{CohortChange, CohortMembership, CourseUserGroup};
pub use course::{CourseEnrollment, CourseKey, InvalidKeyError};
pub use user::{User, UserProfile, GENDER_CHOICES, LEVEL_OF_EDUCATION_CHOICES};
