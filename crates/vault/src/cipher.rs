//! AES-256-GCM payload encryption.
//!
//! Every persisted payload is sealed under a fresh 12-byte IV. The AEAD
//! output is split into ciphertext and the trailing 16-byte authentication
//! tag so the envelope records all three independently. Decryption refuses
//! anything whose tag is missing, short, or does not authenticate.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;
/// IV length in bytes (96-bit GCM nonce).
pub const IV_LEN: usize = 12;
/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// The persisted shape of an encrypted payload. All fields are hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub ciphertext: String,
    pub iv: String,
    #[serde(default)]
    pub auth_tag: String,
}

/// Errors from payload encryption.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Envelope has no authentication tag")]
    MissingTag,

    #[error("Authentication failed: payload was tampered with or the key is wrong")]
    Authentication,

    #[error("Encryption failed")]
    Encryption,
}

/// Symmetric cipher bound to one vault key.
pub struct Cipher {
    aead: Aes256Gcm,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("algorithm", &"aes-256-gcm")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl Cipher {
    /// Create a cipher from raw key bytes.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let aead = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        Ok(Self { aead })
    }

    /// Create a cipher from a hex-encoded key.
    pub fn from_hex(key_hex: &str) -> Result<Self, CipherError> {
        let key = hex::decode(key_hex.trim())
            .map_err(|e| CipherError::InvalidKey(format!("not hex: {e}")))?;
        Self::new(&key)
    }

    /// Generate a fresh random key, hex-encoded.
    pub fn generate_key_hex() -> String {
        let mut key = [0u8; KEY_LEN];
        rand::rng().fill(&mut key[..]);
        hex::encode(key)
    }

    /// Seal a payload under a fresh IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Envelope, CipherError> {
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill(&mut iv[..]);

        let mut sealed = self
            .aead
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| CipherError::Encryption)?;
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(Envelope {
            ciphertext: hex::encode(sealed),
            iv: hex::encode(iv),
            auth_tag: hex::encode(tag),
        })
    }

    /// Open an envelope, verifying the tag before returning any plaintext.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>, CipherError> {
        if envelope.auth_tag.is_empty() {
            return Err(CipherError::MissingTag);
        }

        let iv = decode_field("iv", &envelope.iv)?;
        if iv.len() != IV_LEN {
            return Err(CipherError::MalformedEnvelope(format!(
                "iv must be {IV_LEN} bytes, got {}",
                iv.len()
            )));
        }

        let tag = decode_field("auth_tag", &envelope.auth_tag)?;
        if tag.len() != TAG_LEN {
            return Err(CipherError::MalformedEnvelope(format!(
                "auth_tag must be {TAG_LEN} bytes, got {}",
                tag.len()
            )));
        }

        let mut sealed = decode_field("ciphertext", &envelope.ciphertext)?;
        sealed.extend_from_slice(&tag);

        self.aead
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| CipherError::Authentication)
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, CipherError> {
    hex::decode(value).map_err(|e| CipherError::MalformedEnvelope(format!("{name}: {e}")))
}
