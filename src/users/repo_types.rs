use std::{fmt, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::auth::{claims::FullName, AccessSubject};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

pub const DEFAULT_PROFILE_IMAGE: &str = "default-profile.png";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_phone(phone: &str) -> bool {
    lazy_static! {
        static ref PHONE_RE: Regex = Regex::new(r"^[0-9]{10}$").unwrap();
    }
    PHONE_RE.is_match(phone)
}

pub(crate) fn is_http_url(url: &str) -> bool {
    lazy_static! {
        static ref URL_RE: Regex = Regex::new(r"^https?://.+$").unwrap();
    }
    URL_RE.is_match(url)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Invalid role: {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Gender {
    Male,
    Female,
    #[default]
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            "Other" => Ok(Gender::Other),
            other => Err(format!("Invalid gender: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Suspended,
    Inactive,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "suspended" => Ok(AccountStatus::Suspended),
            "inactive" => Ok(AccountStatus::Inactive),
            other => Err(format!("Invalid account status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    pub fullname: FullName,
    pub phone: Option<String>,
    #[serde(with = "iso_date::option")]
    pub date_of_birth: Option<Date>,
    pub gender: Gender,
    pub profile_image: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationalInfo {
    pub grade_level: Option<String>,
    pub subjects_interested: Vec<Uuid>,
    pub subjects_teaching: Vec<Uuid>,
    pub cv: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub account_status: AccountStatus,
    pub is_teacher_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidSubject {
    pub subject_id: Uuid,
    #[serde(with = "time::serde::rfc3339::option")]
    pub payment_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub is_paid: bool,
    pub paid_subjects: Vec<PaidSubject>,
}

/// User record. Secret fields are `None` when loaded with
/// `Projection::Public` and are never serialized.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub role: Role,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub personal_info: PersonalInfo,
    pub educational_info: EducationalInfo,
    pub status: UserStatus,
    pub payment_info: PaymentInfo,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Drops secret fields.
    pub fn sanitized(mut self) -> Self {
        self.password_hash = None;
        self.refresh_token = None;
        self
    }
}

impl From<&User> for AccessSubject {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            fullname: user.personal_info.fullname.clone(),
        }
    }
}

/// Flat `users` row as stored in Postgres.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub role: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub refresh_token: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<Date>,
    pub gender: String,
    pub profile_image: String,
    pub grade_level: Option<String>,
    pub subjects_interested: Vec<Uuid>,
    pub subjects_teaching: Vec<Uuid>,
    pub cv: Option<String>,
    pub account_status: String,
    pub is_teacher_verified: bool,
    pub is_paid: bool,
    pub paid_subjects: Json<Vec<PaidSubject>>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = String;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            role: r.role.parse()?,
            email: r.email,
            password_hash: r.password_hash,
            refresh_token: r.refresh_token,
            personal_info: PersonalInfo {
                fullname: FullName {
                    first_name: r.first_name,
                    last_name: r.last_name,
                },
                phone: r.phone,
                date_of_birth: r.date_of_birth,
                gender: r.gender.parse()?,
                profile_image: r.profile_image,
            },
            educational_info: EducationalInfo {
                grade_level: r.grade_level,
                subjects_interested: r.subjects_interested,
                subjects_teaching: r.subjects_teaching,
                cv: r.cv,
            },
            status: UserStatus {
                account_status: r.account_status.parse()?,
                is_teacher_verified: r.is_teacher_verified,
            },
            payment_info: PaymentInfo {
                is_paid: r.is_paid,
                paid_subjects: r.paid_subjects.0,
            },
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Role-specific requirements known before any file is uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleDraft {
    Student {
        grade_level: String,
        subjects_interested: Vec<Uuid>,
    },
    Teacher {
        grade_level: String,
        subjects_teaching: Vec<Uuid>,
    },
    Admin {
        grade_level: Option<String>,
    },
}

impl RoleDraft {
    pub fn role(&self) -> Role {
        match self {
            RoleDraft::Student { .. } => Role::Student,
            RoleDraft::Teacher { .. } => Role::Teacher,
            RoleDraft::Admin { .. } => Role::Admin,
        }
    }

    pub fn subject_refs(&self) -> &[Uuid] {
        match self {
            RoleDraft::Student {
                subjects_interested,
                ..
            } => subjects_interested.as_slice(),
            RoleDraft::Teacher {
                subjects_teaching, ..
            } => subjects_teaching.as_slice(),
            RoleDraft::Admin { .. } => &[],
        }
    }

    /// Attaches the uploaded CV. Teachers cannot exist without one.
    pub fn into_enrollment(self, cv: Option<String>) -> Result<Enrollment, String> {
        match self {
            RoleDraft::Student {
                grade_level,
                subjects_interested,
            } => Ok(Enrollment::Student {
                grade_level,
                subjects_interested,
                cv,
            }),
            RoleDraft::Teacher {
                grade_level,
                subjects_teaching,
            } => {
                let cv = cv.ok_or_else(|| "CV is required for teachers".to_string())?;
                Ok(Enrollment::Teacher {
                    grade_level,
                    subjects_teaching,
                    cv,
                })
            }
            RoleDraft::Admin { grade_level } => Ok(Enrollment::Admin { grade_level, cv }),
        }
    }
}

/// Educational profile of a new user, one variant per role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrollment {
    Student {
        grade_level: String,
        subjects_interested: Vec<Uuid>,
        cv: Option<String>,
    },
    Teacher {
        grade_level: String,
        subjects_teaching: Vec<Uuid>,
        cv: String,
    },
    Admin {
        grade_level: Option<String>,
        cv: Option<String>,
    },
}

impl Enrollment {
    pub fn role(&self) -> Role {
        match self {
            Enrollment::Student { .. } => Role::Student,
            Enrollment::Teacher { .. } => Role::Teacher,
            Enrollment::Admin { .. } => Role::Admin,
        }
    }

    pub fn grade_level(&self) -> Option<&str> {
        match self {
            Enrollment::Student { grade_level, .. } | Enrollment::Teacher { grade_level, .. } => {
                Some(grade_level.as_str())
            }
            Enrollment::Admin { grade_level, .. } => grade_level.as_deref(),
        }
    }

    pub fn subjects_interested(&self) -> &[Uuid] {
        match self {
            Enrollment::Student {
                subjects_interested,
                ..
            } => subjects_interested.as_slice(),
            _ => &[],
        }
    }

    pub fn subjects_teaching(&self) -> &[Uuid] {
        match self {
            Enrollment::Teacher {
                subjects_teaching, ..
            } => subjects_teaching.as_slice(),
            _ => &[],
        }
    }

    pub fn cv(&self) -> Option<&str> {
        match self {
            Enrollment::Teacher { cv, .. } => Some(cv.as_str()),
            Enrollment::Student { cv, .. } | Enrollment::Admin { cv, .. } => cv.as_deref(),
        }
    }
}

/// Fully assembled user ready for `UserStore::create`. The password is
/// already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub fullname: FullName,
    pub phone: Option<String>,
    pub date_of_birth: Option<Date>,
    pub gender: Gender,
    pub profile_image: Option<String>,
    pub enrollment: Enrollment,
}

impl NewUser {
    pub fn role(&self) -> Role {
        self.enrollment.role()
    }

    pub fn profile_image_or_default(&self) -> &str {
        self.profile_image.as_deref().unwrap_or(DEFAULT_PROFILE_IMAGE)
    }

    /// Write-time invariants of the `users` collection.
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_email(&self.email) || self.email != self.email.trim().to_lowercase() {
            return Err("Invalid email".into());
        }
        if self.password_hash.is_empty() {
            return Err("Password is required".into());
        }
        if self.fullname.first_name.trim().is_empty() || self.fullname.last_name.trim().is_empty() {
            return Err("First and last name are required".into());
        }
        if let Some(phone) = &self.phone {
            if !is_valid_phone(phone) {
                return Err("Phone number must be exactly 10 digits".into());
            }
        }
        if let Some(image) = &self.profile_image {
            if image.trim().is_empty() {
                return Err("Profile image reference must not be empty".into());
            }
        }
        if let Some(grade) = self.enrollment.grade_level() {
            if grade.trim().is_empty() {
                return Err("Grade level is required".into());
            }
        }
        match &self.enrollment {
            Enrollment::Student {
                subjects_interested,
                ..
            } if subjects_interested.is_empty() => {
                return Err("Students must list at least one subject of interest".into())
            }
            Enrollment::Teacher {
                subjects_teaching, ..
            } if subjects_teaching.is_empty() => {
                return Err("Teachers must list at least one subject they teach".into())
            }
            _ => {}
        }
        if let Some(cv) = self.enrollment.cv() {
            if !is_http_url(cv) {
                return Err("CV must be an http(s) URL".into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teacher() -> NewUser {
        NewUser {
            email: "grace@example.com".into(),
            password_hash: "$argon2id$stub".into(),
            fullname: FullName {
                first_name: "Grace".into(),
                last_name: "Hopper".into(),
            },
            phone: Some("0123456789".into()),
            date_of_birth: None,
            gender: Gender::Female,
            profile_image: Some("https://cdn.test/p.png".into()),
            enrollment: Enrollment::Teacher {
                grade_level: "College".into(),
                subjects_teaching: vec![Uuid::new_v4()],
                cv: "https://cdn.test/cv.pdf".into(),
            },
        }
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn phone_must_be_ten_digits() {
        assert!(is_valid_phone("0123456789"));
        assert!(!is_valid_phone("012345678"));
        assert!(!is_valid_phone("01234567890"));
        assert!(!is_valid_phone("01234-6789"));
    }

    #[test]
    fn role_matches_exact_lowercase_names() {
        assert_eq!(" teacher ".parse::<Role>().unwrap(), Role::Teacher);
        assert!("Teacher".parse::<Role>().is_err());
        assert!(" TEACHER ".parse::<Role>().is_err());
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn valid_teacher_passes() {
        assert!(teacher().validate().is_ok());
    }

    #[test]
    fn teacher_without_subjects_is_rejected() {
        let mut u = teacher();
        u.enrollment = Enrollment::Teacher {
            grade_level: "College".into(),
            subjects_teaching: vec![],
            cv: "https://cdn.test/cv.pdf".into(),
        };
        assert!(u.validate().unwrap_err().contains("subject"));
    }

    #[test]
    fn cv_must_be_http_url() {
        let mut u = teacher();
        u.enrollment = Enrollment::Teacher {
            grade_level: "College".into(),
            subjects_teaching: vec![Uuid::new_v4()],
            cv: "ftp://nope".into(),
        };
        assert_eq!(u.validate().unwrap_err(), "CV must be an http(s) URL");
    }

    #[test]
    fn unnormalized_email_is_rejected() {
        let mut u = teacher();
        u.email = "Grace@Example.com".into();
        assert_eq!(u.validate().unwrap_err(), "Invalid email");
    }

    #[test]
    fn student_needs_subjects_of_interest() {
        let mut u = teacher();
        u.enrollment = Enrollment::Student {
            grade_level: "Middle".into(),
            subjects_interested: vec![],
            cv: None,
        };
        assert!(u.validate().is_err());
    }

    #[test]
    fn teacher_draft_requires_cv() {
        let draft = RoleDraft::Teacher {
            grade_level: "High School".into(),
            subjects_teaching: vec![Uuid::new_v4()],
        };
        assert_eq!(
            draft.clone().into_enrollment(None).unwrap_err(),
            "CV is required for teachers"
        );
        let enrollment = draft.into_enrollment(Some("https://x/cv.pdf".into())).unwrap();
        assert_eq!(enrollment.cv(), Some("https://x/cv.pdf"));
        assert_eq!(enrollment.role(), Role::Teacher);
    }

    #[test]
    fn admin_has_no_subject_refs() {
        let draft = RoleDraft::Admin { grade_level: None };
        assert!(draft.subject_refs().is_empty());
        assert_eq!(draft.into_enrollment(None).unwrap().grade_level(), None);
    }

    #[test]
    fn paid_subject_serializes_rfc3339() {
        let p = PaidSubject {
            subject_id: Uuid::nil(),
            payment_date: Some(time::macros::datetime!(2024-03-01 10:00 UTC)),
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["paymentDate"], "2024-03-01T10:00:00Z");
        let back: PaidSubject = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }
}
