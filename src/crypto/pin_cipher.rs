//! Encryption of message payloads under a key derived from the message PIN.
//!
//! There is no stored copy of the PIN or of a PIN hash: the per-message salt
//! plus the AES-GCM tag are the verifier, so a candidate PIN is correct
//! exactly when the ciphertext authenticates under the key it derives.

use std::sync::Arc;
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::crypto::aes::{self, SecureKey};
use crate::crypto::kdf::{derive_key, KdfLimiter, KdfParams};
use crate::crypto::pin::Pin;
use crate::error::{AppError, Result};

/// Size of the per-message key derivation salt.
pub const SALT_SIZE: usize = 16;

/// A payload encrypted under a PIN-derived key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedPayload {
    /// AES-256-GCM `ciphertext || nonce`.
    pub ciphertext: Vec<u8>,
    /// Salt fed to argon2 together with the PIN.
    pub pin_salt: [u8; SALT_SIZE],
}

/// The crypto engine for secret messages.
#[derive(Clone)]
pub struct PinCipher {
    pepper: Arc<Zeroizing<Vec<u8>>>,
    params: KdfParams,
    limiter: KdfLimiter,
}

impl PinCipher {
    /// Creates a cipher that mixes `pepper` into every key and runs at
    /// most `max_concurrent` derivations at once.
    pub fn new(pepper: &[u8], params: KdfParams, max_concurrent: usize) -> Self {
        Self {
            pepper: Arc::new(Zeroizing::new(pepper.to_vec())),
            params,
            limiter: KdfLimiter::new(max_concurrent),
        }
    }

    async fn derive(&self, pin: Pin, salt: [u8; SALT_SIZE]) -> Result<SecureKey> {
        let _permit = self.limiter.acquire().await?;
        let pepper = Arc::clone(&self.pepper);
        let params = self.params;

        tokio::task::spawn_blocking(move || {
            let secret = Zeroizing::new(pin.canonical());
            derive_key(secret.as_bytes(), &salt, &pepper, params)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Key derivation task failed: {}", e)))?
    }

    /// Encrypts `payload` so that only `pin` can open it.
    pub async fn encrypt(&self, payload: &[u8], pin: Pin) -> Result<SealedPayload> {
        let mut pin_salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut pin_salt);

        let key = self.derive(pin, pin_salt).await?;
        let ciphertext = aes::seal(&key, payload)?;

        Ok(SealedPayload { ciphertext, pin_salt })
    }

    /// Decrypts `sealed` with a candidate PIN.
    ///
    /// The key is always derived before the ciphertext is inspected, so a
    /// malformed record costs the same as a wrong PIN. Both fail with
    /// `AppError::Decryption`.
    pub async fn decrypt(&self, sealed: &SealedPayload, candidate: Pin) -> Result<Zeroizing<Vec<u8>>> {
        let key = self.derive(candidate, sealed.pin_salt).await?;
        aes::open(&key, &sealed.ciphertext)
    }
}
