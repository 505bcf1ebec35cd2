use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Subject, SubjectRow};
use crate::error::StoreError;

/// Read access to the subject catalogue, which is managed elsewhere.
#[async_trait]
pub trait SubjectStore: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Subject>, StoreError>;

    /// The subset of `ids` that exist and are active.
    async fn find_active_ids(&self, ids: &[Uuid]) -> Result<Vec<Uuid>, StoreError>;
}

#[derive(Clone)]
pub struct PgSubjectStore {
    db: PgPool,
}

impl PgSubjectStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SubjectStore for PgSubjectStore {
    async fn list_active(&self) -> Result<Vec<Subject>, StoreError> {
        let rows = sqlx::query_as::<_, SubjectRow>(
            r#"
            SELECT id, name, description, grade_level, teachers, students,
                   is_active, created_at, updated_at
              FROM subjects
             WHERE is_active
             ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|r| Subject::try_from(r).map_err(StoreError::Corrupt))
            .collect()
    }

    async fn find_active_ids(&self, ids: &[Uuid]) -> Result<Vec<Uuid>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let found: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id
              FROM subjects
             WHERE id = ANY($1) AND is_active
            "#,
        )
        .bind(ids)
        .fetch_all(&self.db)
        .await?;
        Ok(found)
    }
}
