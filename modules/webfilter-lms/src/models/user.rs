use chrono::{DateTime, Utc};
use webfilter_engine::{patch_field, Field, Inspect, Patchable, View};

/// A learner account. `password` holds the stored hash and never leaves the
/// process.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
    pub profile: UserProfile,
}

impl User {
    pub fn new(id: i64, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            password: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            last_login: None,
            date_joined: Utc::now(),
            profile: UserProfile::new(id, id),
        }
    }
}

static USER_FIELDS: [Field<User>; 9] = [
    patch_field!(username: Text),
    patch_field!(email: Text),
    patch_field!(first_name: Text),
    patch_field!(last_name: Text),
    patch_field!(is_active: Boolean),
    patch_field!(is_staff: Boolean),
    patch_field!(is_superuser: Boolean),
    patch_field!(last_login: OptionalTimestamp),
    patch_field!(date_joined: Timestamp),
];

impl Patchable for User {
    const ENTITY: &'static str = "user";

    fn fields() -> &'static [Field<Self>] {
        &USER_FIELDS
    }

    fn identity(&self) -> i64 {
        self.id
    }
}

// The profile is sent as its own context entry.
impl Inspect for User {
    fn view(&self) -> View<'_> {
        View::Fields(vec![
            ("id", &self.id as &dyn Inspect),
            ("password", &self.password),
            ("last_login", &self.last_login),
            ("is_superuser", &self.is_superuser),
            ("username", &self.username),
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("email", &self.email),
            ("is_staff", &self.is_staff),
            ("is_active", &self.is_active),
            ("date_joined", &self.date_joined),
        ])
    }
}

pub const LEVEL_OF_EDUCATION_CHOICES: &[(&str, &str)] = &[
    ("p", "Doctorate"),
    ("m", "Master's or professional degree"),
    ("b", "Bachelor's degree"),
    ("a", "Associate degree"),
    ("hs", "Secondary/high school"),
    ("jhs", "Junior secondary/junior high/middle school"),
    ("el", "Elementary/primary school"),
    ("none", "No formal education"),
    ("other", "Other education"),
];

pub const GENDER_CHOICES: &[(&str, &str)] = &[("m", "Male"), ("f", "Female"), ("o", "Other")];

#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub meta: String,
    pub courseware: String,
    pub language: String,
    pub location: String,
    pub year_of_birth: Option<i64>,
    pub gender: Option<String>,
    pub level_of_education: Option<String>,
    pub mailing_address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub goals: Option<String>,
    pub bio: Option<String>,
    pub profile_image_uploaded_at: Option<DateTime<Utc>>,
    pub phone_number: Option<String>,
}

impl UserProfile {
    pub fn new(id: i64, user_id: i64) -> Self {
        Self {
            id,
            user_id,
            name: String::new(),
            meta: String::new(),
            courseware: "course.xml".to_string(),
            language: String::new(),
            location: String::new(),
            year_of_birth: None,
            gender: None,
            level_of_education: None,
            mailing_address: None,
            city: None,
            country: None,
            state: None,
            goals: None,
            bio: None,
            profile_image_uploaded_at: None,
            phone_number: None,
        }
    }
}

static PROFILE_FIELDS: [Field<UserProfile>; 16] = [
    patch_field!(name: Text),
    patch_field!(meta: Text),
    patch_field!(courseware: Text),
    patch_field!(language: Text),
    patch_field!(location: Text),
    patch_field!(year_of_birth: OptionalInteger),
    patch_field!(gender: OptionalText),
    patch_field!(level_of_education: OptionalText),
    patch_field!(mailing_address: OptionalText),
    patch_field!(city: OptionalText),
    patch_field!(country: OptionalText),
    patch_field!(state: OptionalText),
    patch_field!(goals: OptionalText),
    patch_field!(bio: OptionalText),
    patch_field!(profile_image_uploaded_at: OptionalTimestamp),
    patch_field!(phone_number: OptionalText),
];

impl Patchable for UserProfile {
    const ENTITY: &'static str = "user_profile";

    fn fields() -> &'static [Field<Self>] {
        &PROFILE_FIELDS
    }

    fn identity(&self) -> i64 {
        self.id
    }
}

impl Inspect for UserProfile {
    fn view(&self) -> View<'_> {
        View::Fields(vec![
            ("id", &self.id as &dyn Inspect),
            ("user_id", &self.user_id),
            ("name", &self.name),
            ("meta", &self.meta),
            ("courseware", &self.courseware),
            ("language", &self.language),
            ("location", &self.location),
            ("year_of_birth", &self.year_of_birth),
            ("gender", &self.gender),
            ("level_of_education", &self.level_of_education),
            ("mailing_address", &self.mailing_address),
            ("city", &self.city),
            ("country", &self.country),
            ("state", &self.state),
            ("goals", &self.goals),
            ("bio", &self.bio),
            ("profile_image_uploaded_at", &self.profile_image_uploaded_at),
            ("phone_number", &self.phone_number),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use webfilter_engine::{apply, PayloadSerializer};

    #[test]
    fn serialized_user_has_no_password_or_profile() {
        let mut user = User::new(4, "andres", "andres@example.com");
        user.password = "pbkdf2_sha256$260000$abc".into();

        let out = PayloadSerializer::default().serialize(&user);
        assert_eq!(out["id"], 4);
        assert_eq!(out["username"], "andres");
        assert_eq!(out["last_login"], json!(null));
        assert!(out.get("password").is_none());
        assert!(out.get("profile").is_none());
    }

    #[test]
    fn profile_patch_coerces_by_field_kind() {
        let mut profile = UserProfile::new(2, 4);
        let patch = json!({
            "year_of_birth": "1990",
            "city": "Quito",
            "user_id": 9,
            "profile_image_uploaded_at": "2023-06-13T15:04:10+00:00",
        });
        let report = apply(&mut profile, patch.as_object().unwrap(), &PayloadSerializer::default());

        assert_eq!(profile.year_of_birth, Some(1990));
        assert_eq!(profile.city.as_deref(), Some("Quito"));
        assert_eq!(profile.user_id, 4);
        assert!(profile.profile_image_uploaded_at.is_some());
        assert_eq!(report.applied.len(), 3);
    }

    #[test]
    fn user_patch_cannot_touch_password_or_id() {
        let mut user = User::new(4, "andres", "andres@example.com");
        user.password = "hash".into();
        let patch = json!({"id": 1, "password": "plain", "first_name": "Andrés"});
        apply(&mut user, patch.as_object().unwrap(), &PayloadSerializer::default());

        assert_eq!(user.id, 4);
        assert_eq!(user.password, "hash");
        assert_eq!(user.first_name, "Andrés");
    }
}
