use std::str::FromStr;

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum GradeBand {
    Primary,
    Middle,
    #[serde(rename = "High School")]
    HighSchool,
    College,
    University,
}

impl FromStr for GradeBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Primary" => Ok(GradeBand::Primary),
            "Middle" => Ok(GradeBand::Middle),
            "High School" => Ok(GradeBand::HighSchool),
            "College" => Ok(GradeBand::College),
            "University" => Ok(GradeBand::University),
            other => Err(format!("Invalid grade band: {other}")),
        }
    }
}

/// Subject catalogue entry. Teacher/student lists are back references to
/// users, not owned by the subject.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub grade_level: Option<GradeBand>,
    pub teachers: Vec<Uuid>,
    pub students: Vec<Uuid>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct SubjectRow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub grade_level: Option<String>,
    pub teachers: Vec<Uuid>,
    pub students: Vec<Uuid>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<SubjectRow> for Subject {
    type Error = String;

    fn try_from(r: SubjectRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            description: r.description,
            grade_level: r.grade_level.as_deref().map(str::parse).transpose()?,
            teachers: r.teachers,
            students: r.students,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}
