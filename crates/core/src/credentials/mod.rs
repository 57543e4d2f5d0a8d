//! At-rest protection for provider API keys.
//!
//! Keys are sealed with AES-256-GCM under a key derived from the current
//! user id with PBKDF2-HMAC-SHA256 (fixed salt and iteration count).
//! Ciphertext, nonce and authentication tag are stored base64-encoded.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

const KDF_SALT: &[u8] = b"genloom-credential-vault";
const KDF_ITERATIONS: u32 = 100_000;
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Errors raised while sealing or opening a secret.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("invalid base64 in {field}: {reason}")]
    Encoding { field: &'static str, reason: String },

    #[error("nonce must be {NONCE_LEN} bytes, got {0}")]
    InvalidNonce(usize),

    #[error("authentication tag must be {TAG_LEN} bytes, got {0}")]
    InvalidTag(usize),

    #[error("decryption failed (wrong user id or tampered secret)")]
    Decrypt,

    #[error("encryption failed")]
    Encrypt,

    #[error("decrypted secret is not valid UTF-8")]
    NotUtf8,

    #[error("no user id configured for credential decryption")]
    MissingUserId,
}

/// An encrypted secret as stored in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
}

fn derive_key(user_id: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(user_id.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut key);
    key
}

fn decode(field: &'static str, value: &str) -> Result<Vec<u8>, CredentialError> {
    BASE64
        .decode(value.trim())
        .map_err(|e| CredentialError::Encoding {
            field,
            reason: e.to_string(),
        })
}

/// Decrypt a stored secret for `user_id`.
pub fn decrypt_secret(secret: &EncryptedSecret, user_id: &str) -> Result<String, CredentialError> {
    if user_id.is_empty() {
        return Err(CredentialError::MissingUserId);
    }

    let nonce = decode("iv", &secret.iv)?;
    if nonce.len() != NONCE_LEN {
        return Err(CredentialError::InvalidNonce(nonce.len()));
    }
    let tag = decode("auth_tag", &secret.auth_tag)?;
    if tag.len() != TAG_LEN {
        return Err(CredentialError::InvalidTag(tag.len()));
    }

    // aes-gcm expects the tag appended to the ciphertext
    let mut sealed = decode("ciphertext", &secret.ciphertext)?;
    sealed.extend_from_slice(&tag);

    let key = derive_key(user_id);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CredentialError::Decrypt)?;
    let plain = cipher
        .decrypt(Nonce::from_slice(&nonce), sealed.as_ref())
        .map_err(|_| CredentialError::Decrypt)?;

    String::from_utf8(plain).map_err(|_| CredentialError::NotUtf8)
}

/// Encrypt `plaintext` for `user_id` with a random nonce.
pub fn encrypt_secret(plaintext: &str, user_id: &str) -> Result<EncryptedSecret, CredentialError> {
    if user_id.is_empty() {
        return Err(CredentialError::MissingUserId);
    }

    let key = derive_key(user_id);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CredentialError::Encrypt)?;
    let nonce: [u8; NONCE_LEN] = rand::random();
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| CredentialError::Encrypt)?;

    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok(EncryptedSecret {
        ciphertext: BASE64.encode(&sealed),
        iv: BASE64.encode(nonce),
        auth_tag: BASE64.encode(tag),
    })
}
