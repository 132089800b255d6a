//! Content encryption with AES-256-GCM

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use msgsvc_shared::constants::ENCRYPTION_KEY_LEN;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Integrity check failed: ciphertext or tag was altered")]
    IntegrityFailure,

    #[error("Encryption failed")]
    EncryptionFailed,
}

/// Encrypted content as persisted: hex-encoded IV, ciphertext and GCM tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    pub iv: String,
    pub ciphertext: String,
    pub tag: String,
}

/// Process-scoped AES-256-GCM cipher. The key is fixed for the life of the instance.
#[derive(Clone)]
pub struct ContentCipher {
    aead: Aes256Gcm,
}

impl std::fmt::Debug for ContentCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContentCipher { .. }")
    }
}

impl ContentCipher {
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != ENCRYPTION_KEY_LEN {
            return Err(CipherError::InvalidKey(format!(
                "expected {} bytes, got {}",
                ENCRYPTION_KEY_LEN,
                key.len()
            )));
        }
        let aead = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        Ok(Self { aead })
    }

    /// Build from the 64-character hex form used in configuration.
    pub fn from_hex(key_hex: &str) -> Result<Self, CipherError> {
        let key = hex::decode(key_hex.trim()).map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        Self::new(&key)
    }

    /// Encrypt under a fresh random 96-bit IV.
    pub fn encrypt(&self, plaintext: &str) -> Result<Envelope, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .aead
            .encrypt_in_place_detached(&nonce, b"", &mut buffer)
            .map_err(|_| CipherError::EncryptionFailed)?;

        Ok(Envelope {
            iv: hex::encode(nonce),
            ciphertext: hex::encode(&buffer),
            tag: hex::encode(tag),
        })
    }

    /// Verify the tag and return the plaintext. Nothing is released on failure.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<String, CipherError> {
        let iv = decode_field("iv", &envelope.iv, Some(IV_LEN))?;
        let tag = decode_field("tag", &envelope.tag, Some(TAG_LEN))?;
        let mut buffer = decode_field("ciphertext", &envelope.ciphertext, None)?;

        self.aead
            .decrypt_in_place_detached(
                GenericArray::from_slice(&iv),
                b"",
                &mut buffer,
                GenericArray::from_slice(&tag),
            )
            .map_err(|_| CipherError::IntegrityFailure)?;

        String::from_utf8(buffer)
            .map_err(|_| CipherError::MalformedEnvelope("plaintext is not valid utf-8".into()))
    }
}

fn decode_field(name: &str, value: &str, expected_len: Option<usize>) -> Result<Vec<u8>, CipherError> {
    if value.is_empty() && expected_len.is_some() {
        return Err(CipherError::MalformedEnvelope(format!("{name} is missing")));
    }
    let bytes = hex::decode(value)
        .map_err(|e| CipherError::MalformedEnvelope(format!("{name} is not hex: {e}")))?;
    match expected_len {
        Some(len) if bytes.len() != len => Err(CipherError::MalformedEnvelope(format!(
            "{name} must be {len} bytes, got {}",
            bytes.len()
        ))),
        _ => Ok(bytes),
    }
}
