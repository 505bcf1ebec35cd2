use std::{sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::auth::{PasswordCodec, TokenIssuer};
use crate::config::AppConfig;
use crate::storage::{Storage, StorageClient};
use crate::subjects::{PgSubjectStore, SubjectStore};
use crate::uploads::{Stager, UploadGateway};
use crate::users::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub subjects: Arc<dyn SubjectStore>,
    pub uploads: UploadGateway,
    pub stager: Stager,
    pub tokens: TokenIssuer,
    pub passwords: PasswordCodec,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;
        tracing::info!("migrations applied");

        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;

        Self::from_parts(
            config,
            Arc::new(PgUserStore::new(db.clone())),
            Arc::new(PgSubjectStore::new(db)),
            storage,
        )
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        subjects: Arc<dyn SubjectStore>,
        storage: Arc<dyn StorageClient>,
    ) -> anyhow::Result<Self> {
        let uploads = UploadGateway::new(
            storage,
            Duration::from_secs(config.storage.upload_timeout_secs),
        );
        Ok(Self {
            stager: Stager::new(&config.uploads),
            tokens: TokenIssuer::new(&config.jwt),
            passwords: PasswordCodec::new(&config.hashing)?,
            uploads,
            users,
            subjects,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn schema_migration_is_embedded() {
        let migrator = sqlx::migrate!("./migrations");
        let versions: Vec<i64> = migrator.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1]);
    }
}
