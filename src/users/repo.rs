use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::repo_types::{NewUser, PaidSubject, User, UserRow};
use crate::error::StoreError;

/// Which fields a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    WithSecrets,
    /// `password_hash` and `refresh_token` are left out.
    Public,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid, projection: Projection) -> Result<Option<User>, StoreError>;

    /// Persists a validated user. The password must already be hashed.
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;

    async fn set_refresh_token(&self, id: Uuid, token: &str) -> Result<(), StoreError>;
}

const PUBLIC_COLUMNS: &str = r#"
    id, role, email, first_name, last_name, phone, date_of_birth, gender,
    profile_image, grade_level, subjects_interested, subjects_teaching, cv,
    account_status, is_teacher_verified, is_paid, paid_subjects, created_at, updated_at
"#;

fn columns(projection: Projection) -> String {
    match projection {
        Projection::WithSecrets => format!("password_hash, refresh_token, {PUBLIC_COLUMNS}"),
        Projection::Public => {
            format!("NULL::text AS password_hash, NULL::text AS refresh_token, {PUBLIC_COLUMNS}")
        }
    }
}

fn into_user(row: UserRow) -> Result<User, StoreError> {
    User::try_from(row).map_err(StoreError::Corrupt)
}

fn map_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Duplicate("email");
        }
        if db.is_check_violation() {
            return StoreError::Validation(format!(
                "constraint {} violated",
                db.constraint().unwrap_or("unknown")
            ));
        }
    }
    StoreError::Database(e)
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {} FROM users WHERE email = $1",
            columns(Projection::WithSecrets)
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        row.map(into_user).transpose()
    }

    async fn find_by_id(&self, id: Uuid, projection: Projection) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", columns(projection));
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.map(into_user).transpose()
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        new_user.validate().map_err(StoreError::Validation)?;

        let sql = format!(
            r#"
            INSERT INTO users (
                id, role, email, password_hash, first_name, last_name, phone,
                date_of_birth, gender, profile_image, grade_level,
                subjects_interested, subjects_teaching, cv, paid_subjects
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {}
            "#,
            columns(Projection::WithSecrets)
        );

        let e = &new_user.enrollment;
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(new_user.role().as_str())
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(new_user.fullname.first_name.trim())
            .bind(new_user.fullname.last_name.trim())
            .bind(new_user.phone.as_deref())
            .bind(new_user.date_of_birth)
            .bind(new_user.gender.as_str())
            .bind(new_user.profile_image_or_default())
            .bind(e.grade_level())
            .bind(e.subjects_interested())
            .bind(e.subjects_teaching())
            .bind(e.cv())
            .bind(Json(Vec::<PaidSubject>::new()))
            .fetch_one(&self.db)
            .await
            .map_err(map_write_error)?;

        let user = into_user(row)?;
        debug!(user_id = %user.id, role = %user.role, "user row inserted");
        Ok(user)
    }

    async fn set_refresh_token(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = $2, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
