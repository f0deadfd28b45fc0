//! At-rest encryption of provider API keys.
//!
//! AES-256-GCM with a random 96-bit nonce prepended to the ciphertext; the
//! stored form is standard base64 of `nonce || ciphertext`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use secrecy::SecretString;
use thiserror::Error;

const NONCE_LEN: usize = 12;

/// Cipher failures
#[derive(Debug, Error)]
pub enum CipherError {
    /// Key material is unusable
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),
    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),
    /// Stored value could not be decrypted
    #[error("decryption failed: {0}")]
    Decryption(String),
}

/// Encrypts and decrypts provider API keys
#[derive(Clone)]
pub struct ApiKeyCipher {
    cipher: Aes256Gcm,
}

impl ApiKeyCipher {
    /// Create from raw key bytes (must be 32 bytes)
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != 32 {
            return Err(CipherError::InvalidKey(format!(
                "key must be 32 bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Create from a base64-encoded key
    pub fn from_base64(b64_key: &str) -> Result<Self, CipherError> {
        let key = STANDARD
            .decode(b64_key.trim())
            .map_err(|e| CipherError::InvalidKey(format!("invalid base64 key: {e}")))?;
        Self::new(&key)
    }

    /// Generate a new random key
    #[must_use]
    pub fn generate_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    /// Encrypt a plaintext key into its stored form
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend(ciphertext);
        Ok(STANDARD.encode(out))
    }

    /// Decrypt a stored key
    pub fn decrypt(&self, stored: &str) -> Result<SecretString, CipherError> {
        let data = STANDARD
            .decode(stored)
            .map_err(|e| CipherError::Decryption(format!("invalid base64: {e}")))?;
        if data.len() <= NONCE_LEN {
            return Err(CipherError::Decryption("ciphertext too short".to_string()));
        }

        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CipherError::Decryption(e.to_string()))?;

        String::from_utf8(plaintext)
            .map(SecretString::new)
            .map_err(|e| CipherError::Decryption(format!("invalid UTF-8: {e}")))
    }
}

impl std::fmt::Debug for ApiKeyCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Compare two byte strings without short-circuiting on the first mismatch
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
