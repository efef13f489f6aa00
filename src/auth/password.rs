use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::PasswordConfig;

/// Argon2id hasher with cost parameters fixed at construction.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
    #[cfg(test)]
    verifies: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

impl PasswordHasher {
    pub fn new(cfg: &PasswordConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 parameters: {e}"))?;
        Ok(Self {
            params,
            #[cfg(test)]
            verifies: Default::default(),
        })
    }

    /// Number of `verify` calls made through this hasher and its clones.
    #[cfg(test)]
    pub(crate) fn verify_count(&self) -> usize {
        self.verifies.load(std::sync::atomic::Ordering::SeqCst)
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

    /// Verification reads the cost parameters from the stored PHC string, so
    /// hashes made under older settings keep verifying.
    pub fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        #[cfg(test)]
        self.verifies
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    /// `hash` on the blocking pool.
    pub async fn hash_async(&self, plain: String) -> anyhow::Result<String> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plain)).await?
    }

    /// `verify` on the blocking pool.
    pub async fn verify_async(&self, plain: String, hash: String) -> anyhow::Result<bool> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash)).await?
    }
}

#[cfg(test)]
pub(crate) fn cheap_hasher() -> PasswordHasher {
    PasswordHasher::new(&PasswordConfig {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    })
    .expect("cheap params are valid")
}
