//! Secret value encryption using AES-256-GCM
//!
//! Provides encryption at rest for OAuth tokens and other credentials.
//! Every call draws a fresh random nonce, so encrypting the same plaintext
//! twice never yields the same blob.
//!
//! Blob layout: `v1.<base64 nonce>.<base64 ciphertext||tag>`

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Nonce size for AES-256-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Key size for AES-256 (256 bits)
pub const KEY_SIZE: usize = 32;

/// Version tag prefixed to every blob
const BLOB_VERSION: &str = "v1";

/// Errors produced by [`SecretCipher`].
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The configured key could not be parsed or has the wrong length.
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    /// The AEAD encryption step failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// The blob is malformed, corrupted, or was sealed under another key.
    #[error("Decryption failed: {0}")]
    Decryption(String),
}

impl CipherError {
    /// Returns `true` if this is a decryption failure.
    #[must_use]
    pub fn is_decryption(&self) -> bool {
        matches!(self, Self::Decryption(_))
    }
}

/// Opaque ciphertext produced by [`SecretCipher::encrypt`].
///
/// Carries the version tag, nonce and ciphertext (with GCM tag) in one
/// string so it can be stored in a single text column.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedBlob(String);

impl EncryptedBlob {
    /// Wraps a blob previously read back from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptedBlob({} bytes)", self.0.len())
    }
}

/// Process-wide symmetric cipher.
///
/// Holds no mutable state; clone it or share it behind an `Arc` freely.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Create a cipher from raw key bytes
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Create a cipher from a hex or base64 encoded key
    pub fn from_encoded_key(key_str: &str) -> Result<Self, CipherError> {
        let key = parse_key(key_str)?;
        Ok(Self::new(&key))
    }

    /// Generate a new random key
    pub fn generate_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    /// Encrypt a plaintext value under a fresh random nonce
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedBlob, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::Encryption(e.to_string()))?;

        Ok(EncryptedBlob(format!(
            "{BLOB_VERSION}.{}.{}",
            BASE64.encode(nonce_bytes),
            BASE64.encode(&ciphertext)
        )))
    }

    /// Decrypt a blob produced by [`SecretCipher::encrypt`]
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<String, CipherError> {
        let mut parts = blob.as_str().splitn(3, '.');
        let (Some(version), Some(nonce_b64), Some(ciphertext_b64)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(CipherError::Decryption("Malformed blob".into()));
        };

        if version != BLOB_VERSION {
            return Err(CipherError::Decryption(format!(
                "Unsupported blob version '{version}'"
            )));
        }

        let nonce_bytes = BASE64
            .decode(nonce_b64)
            .map_err(|e| CipherError::Decryption(format!("Invalid nonce base64: {e}")))?;

        if nonce_bytes.len() != NONCE_SIZE {
            return Err(CipherError::Decryption("Invalid nonce size".into()));
        }

        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| CipherError::Decryption(format!("Invalid ciphertext base64: {e}")))?;

        let nonce = Nonce::from_slice(&nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| CipherError::Decryption("Authentication tag mismatch".into()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CipherError::Decryption(format!("Invalid UTF-8 in decrypted value: {e}")))
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher")
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Parse a key from a hex or base64 string
fn parse_key(key_str: &str) -> Result<[u8; KEY_SIZE], CipherError> {
    let key_str = key_str.trim();

    // Try hex first
    if key_str.len() == KEY_SIZE * 2 {
        if let Ok(bytes) = hex::decode(key_str) {
            let mut key = [0u8; KEY_SIZE];
            key.copy_from_slice(&bytes);
            return Ok(key);
        }
    }

    let bytes = BASE64
        .decode(key_str)
        .map_err(|e| CipherError::InvalidKey(format!("Invalid base64 key: {e}")))?;

    if bytes.len() != KEY_SIZE {
        return Err(CipherError::InvalidKey(format!(
            "Key must be {} bytes, got {}",
            KEY_SIZE,
            bytes.len()
        )));
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}
