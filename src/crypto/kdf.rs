use std::sync::Arc;
use argon2::{Algorithm, Argon2, Params, Version};
use tokio::sync::{Semaphore, SemaphorePermit};
use crate::crypto::aes::{SecureKey, KEY_SIZE};
use crate::error::{AppError, Result};

/// Argon2id cost parameters shared by PIN keys and password hashes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // OWASP minimum for argon2id: 19 MiB, 2 iterations, 1 lane.
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Very cheap parameters for tests. Never use in production.
    pub fn fast() -> Self {
        Self {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    /// Builds the argon2 parameter set.
    pub fn to_argon2(self) -> Result<Params> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, Some(KEY_SIZE))
            .map_err(|e| AppError::Encryption(format!("Argon2 params: {}", e)))
    }

    /// Checks the values are accepted by argon2.
    pub fn validate(self) -> Result<()> {
        self.to_argon2().map(|_| ())
    }
}

/// Derives an AES-256 key from a low-entropy secret (the PIN) and a salt.
///
/// `pepper` is passed to argon2 as its secret input, so the derived key
/// depends on server-side material that is not stored next to the salt.
pub fn derive_key(
    secret: &[u8],
    salt: &[u8],
    pepper: &[u8],
    params: KdfParams,
) -> Result<SecureKey> {
    let argon2 = Argon2::new_with_secret(
        pepper,
        Algorithm::Argon2id,
        Version::V0x13,
        params.to_argon2()?,
    )
    .map_err(|e| AppError::Encryption(format!("Argon2 init error: {}", e)))?;

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(secret, salt, &mut key)
        .map_err(|e| AppError::Encryption(format!("Argon2 key derivation error: {}", e)))?;

    let secure = SecureKey::new(key);
    zeroize::Zeroize::zeroize(&mut key);
    Ok(secure)
}

/// Bounds how many key derivations run at once on the blocking pool.
#[derive(Clone)]
pub struct KdfLimiter {
    semaphore: Arc<Semaphore>,
}

impl KdfLimiter {
    /// Creates a new `KdfLimiter` with `max_concurrent` permits.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Acquires a permit from the semaphore.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.semaphore
            .acquire()
            .await
            .map_err(|e| AppError::Internal(format!("KDF limiter closed: {}", e)))
    }

    /// Returns the number of available permits.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}
