use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::HashingConfig;

/// One-way password hashing with a per-call random salt.
#[derive(Debug, Clone)]
pub struct PasswordCodec {
    params: Params,
}

impl PasswordCodec {
    pub fn new(cfg: &HashingConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Params are read back from the PHC string, so hashes produced under an
    /// older work factor still verify.
    pub fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }
}

impl Default for PasswordCodec {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_codec() -> PasswordCodec {
        PasswordCodec::new(&HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .expect("valid params")
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let codec = cheap_codec();
        let password = "Secur3P@ssw0rd!";
        let hash = codec.hash(password).expect("hashing should succeed");
        assert!(codec.verify(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let codec = cheap_codec();
        let hash = codec.hash("correct-horse-battery-staple").unwrap();
        assert!(!codec.verify("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let codec = cheap_codec();
        let a = codec.hash("repeat-me-please").unwrap();
        let b = codec.hash("repeat-me-please").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
    }

    #[test]
    fn verify_accepts_hash_made_with_other_work_factor() {
        let hash = PasswordCodec::default().hash("portable-secret").unwrap();
        assert!(cheap_codec().verify("portable-secret", &hash).unwrap());
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = cheap_codec().verify("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn rejects_zero_parallelism() {
        let err = PasswordCodec::new(&HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 0,
        });
        assert!(err.is_err());
    }
}
