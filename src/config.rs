use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Prefix of the publicly resolvable URL of stored objects.
    pub public_base_url: String,
    pub upload_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub temp_dir: PathBuf,
    pub max_file_bytes: usize,
}

/// Argon2 work factor.
#[derive(Debug, Clone, Deserialize)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationConfig {
    /// When false, only teachers must attach a CV at registration.
    pub require_cv_for_all_roles: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub uploads: UploadConfig,
    pub hashing: HashingConfig,
    pub registration: RegistrationConfig,
}

pub const DEFAULT_MAX_FILE_BYTES: usize = 2 * 1024 * 1024;

/// One year.
pub const MAX_TOKEN_TTL_MINUTES: i64 = 60 * 24 * 365;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn required_secret(key: &str) -> anyhow::Result<String> {
    let value = std::env::var(key).with_context(|| format!("{key} is not set"))?;
    anyhow::ensure!(!value.trim().is_empty(), "{key} must not be empty");
    Ok(value)
}

fn ttl_minutes(key: &str, default: i64) -> anyhow::Result<i64> {
    let minutes = env_or(key, default);
    anyhow::ensure!(
        (1..=MAX_TOKEN_TTL_MINUTES).contains(&minutes),
        "{key} must be between 1 and {MAX_TOKEN_TTL_MINUTES} minutes"
    );
    Ok(minutes)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;

        let jwt = JwtConfig {
            access_secret: required_secret("ACCESS_TOKEN_SECRET")?,
            refresh_secret: required_secret("REFRESH_TOKEN_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "edureg".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "edureg-users".into()),
            access_ttl_minutes: ttl_minutes("ACCESS_TOKEN_TTL_MINUTES", 60 * 24)?,
            refresh_ttl_minutes: ttl_minutes("REFRESH_TOKEN_TTL_MINUTES", 60 * 24 * 10)?,
        };

        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT").context("S3_ENDPOINT is not set")?,
            bucket: std::env::var("S3_BUCKET").context("S3_BUCKET is not set")?,
            access_key: std::env::var("S3_ACCESS_KEY").context("S3_ACCESS_KEY is not set")?,
            secret_key: std::env::var("S3_SECRET_KEY").context("S3_SECRET_KEY is not set")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            public_base_url: std::env::var("S3_PUBLIC_BASE_URL")
                .context("S3_PUBLIC_BASE_URL is not set")?,
            upload_timeout_secs: env_or("UPLOAD_TIMEOUT_SECS", 30),
        };

        let uploads = UploadConfig {
            temp_dir: std::env::var("UPLOAD_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./public/temp")),
            max_file_bytes: env_or("UPLOAD_MAX_FILE_BYTES", DEFAULT_MAX_FILE_BYTES),
        };

        let defaults = HashingConfig::default();
        let hashing = HashingConfig {
            memory_kib: env_or("PASSWORD_HASH_MEMORY_KIB", defaults.memory_kib),
            iterations: env_or("PASSWORD_HASH_ITERATIONS", defaults.iterations),
            parallelism: env_or("PASSWORD_HASH_PARALLELISM", defaults.parallelism),
        };

        let registration = RegistrationConfig {
            require_cv_for_all_roles: env_or("REQUIRE_CV_FOR_ALL_ROLES", true),
        };

        Ok(Self {
            database_url,
            jwt,
            storage,
            uploads,
            hashing,
            registration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_on_missing_or_unparsable() {
        assert_eq!(env_or("EDUREG_TEST_UNSET_KEY", 30u64), 30);
        std::env::set_var("EDUREG_TEST_BAD_NUMBER", "thirty");
        assert_eq!(env_or("EDUREG_TEST_BAD_NUMBER", 30u64), 30);
        std::env::set_var("EDUREG_TEST_GOOD_NUMBER", "45");
        assert_eq!(env_or("EDUREG_TEST_GOOD_NUMBER", 30u64), 45);
    }

    #[test]
    fn blank_secret_is_refused() {
        std::env::set_var("EDUREG_TEST_BLANK_SECRET", "   ");
        assert!(required_secret("EDUREG_TEST_BLANK_SECRET").is_err());
        assert!(required_secret("EDUREG_TEST_MISSING_SECRET").is_err());
        std::env::set_var("EDUREG_TEST_SECRET", "s3cret");
        assert_eq!(required_secret("EDUREG_TEST_SECRET").unwrap(), "s3cret");
    }

    #[test]
    fn token_ttl_outside_range_is_refused() {
        assert_eq!(ttl_minutes("EDUREG_TEST_TTL_UNSET", 15).unwrap(), 15);
        std::env::set_var("EDUREG_TEST_TTL_HUGE", i64::MAX.to_string());
        assert!(ttl_minutes("EDUREG_TEST_TTL_HUGE", 15).is_err());
        std::env::set_var("EDUREG_TEST_TTL_ZERO", "0");
        assert!(ttl_minutes("EDUREG_TEST_TTL_ZERO", 15).is_err());
        std::env::set_var("EDUREG_TEST_TTL_OK", "90");
        assert_eq!(ttl_minutes("EDUREG_TEST_TTL_OK", 15).unwrap(), 90);
    }

    #[test]
    fn hashing_defaults_match_argon2() {
        let h = HashingConfig::default();
        assert_eq!(h.memory_kib, argon2::Params::DEFAULT_M_COST);
        assert_eq!(h.parallelism, argon2::Params::DEFAULT_P_COST);
    }
}
