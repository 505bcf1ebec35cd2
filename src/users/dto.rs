use time::{macros::format_description, Date};
use uuid::Uuid;

use super::repo_types::{is_valid_email, is_valid_phone, Gender, Role, RoleDraft};
use crate::{auth::claims::FullName, error::AppError};

pub const ALL_FIELDS_REQUIRED: &str = "All fields are required";
pub const MIN_PASSWORD_LEN: usize = 8;

/// Raw text fields of a registration request, as received.
#[derive(Debug, Default, Clone)]
pub struct RegistrationFields {
    pub role: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub grade_level: Option<String>,
    pub subjects_interested: Vec<String>,
    pub subjects_teaching: Vec<String>,
}

impl RegistrationFields {
    /// Records one form field. Returns false for names this form does not use.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        match name {
            "role" => self.role = value,
            "email" => self.email = value,
            "password" => self.password = value,
            "firstName" => self.first_name = value,
            "lastName" => self.last_name = value,
            "phone" => self.phone = Some(value),
            "dateOfBirth" => self.date_of_birth = Some(value),
            "gender" => self.gender = Some(value),
            "gradeLevel" => self.grade_level = Some(value),
            "subjectsInterested" | "subjectsInterested[]" => self.subjects_interested.push(value),
            "subjectsTeaching" | "subjectsTeaching[]" => self.subjects_teaching.push(value),
            _ => return false,
        }
        true
    }

    /// Presence check on the five required fields. Returns the normalized
    /// email used for the uniqueness lookup.
    pub fn required_email(&self) -> Result<String, AppError> {
        let required = [
            &self.role,
            &self.email,
            &self.password,
            &self.first_name,
            &self.last_name,
        ];
        if required.iter().any(|f| f.trim().is_empty()) {
            return Err(AppError::validation(ALL_FIELDS_REQUIRED));
        }
        Ok(self.email.trim().to_lowercase())
    }

    /// Validates and normalizes the request into a draft. Touches no store.
    pub fn into_draft(self) -> Result<RegistrationDraft, AppError> {
        let email = self.required_email()?;

        let role: Role = self.role.parse().map_err(AppError::Validation)?;

        if !is_valid_email(&email) {
            return Err(AppError::validation("Invalid email"));
        }

        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let phone = non_empty(self.phone);
        if let Some(p) = &phone {
            if !is_valid_phone(p) {
                return Err(AppError::validation("Phone number must be exactly 10 digits"));
            }
        }

        let date_of_birth = non_empty(self.date_of_birth)
            .map(|d| {
                Date::parse(&d, format_description!("[year]-[month]-[day]"))
                    .map_err(|_| AppError::validation("Date of birth must be YYYY-MM-DD"))
            })
            .transpose()?;

        let gender = non_empty(self.gender)
            .map(|g| g.parse::<Gender>().map_err(AppError::Validation))
            .transpose()?
            .unwrap_or_default();

        let grade_level = non_empty(self.grade_level);
        let role = match role {
            Role::Student => RoleDraft::Student {
                grade_level: grade_level.ok_or_else(grade_level_required)?,
                subjects_interested: non_empty_refs(
                    &self.subjects_interested,
                    "Students must select at least one subject of interest",
                )?,
            },
            Role::Teacher => RoleDraft::Teacher {
                grade_level: grade_level.ok_or_else(grade_level_required)?,
                subjects_teaching: non_empty_refs(
                    &self.subjects_teaching,
                    "Teachers must select at least one subject to teach",
                )?,
            },
            Role::Admin => RoleDraft::Admin { grade_level },
        };

        Ok(RegistrationDraft {
            email,
            password: self.password,
            fullname: FullName {
                first_name: self.first_name.trim().to_string(),
                last_name: self.last_name.trim().to_string(),
            },
            phone,
            date_of_birth,
            gender,
            role,
        })
    }
}

/// A validated registration, before attachments are uploaded.
#[derive(Debug, Clone)]
pub struct RegistrationDraft {
    pub email: String,
    pub password: String,
    pub fullname: FullName,
    pub phone: Option<String>,
    pub date_of_birth: Option<Date>,
    pub gender: Gender,
    pub role: RoleDraft,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn grade_level_required() -> AppError {
    AppError::validation("Grade level is required for students and teachers")
}

/// Subject ids, accepting repeated fields and comma-separated lists.
/// Duplicates collapse; order of first appearance is kept.
fn parse_subject_refs(raw: &[String]) -> Result<Vec<Uuid>, AppError> {
    let mut ids = Vec::new();
    for token in raw.iter().flat_map(|v| v.split(',')).map(str::trim) {
        if token.is_empty() {
            continue;
        }
        let id = Uuid::parse_str(token)
            .map_err(|_| AppError::validation(format!("Invalid subject id: {token}")))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

fn non_empty_refs(raw: &[String], msg: &str) -> Result<Vec<Uuid>, AppError> {
    let ids = parse_subject_refs(raw)?;
    if ids.is_empty() {
        return Err(AppError::validation(msg));
    }
    Ok(ids)
}
