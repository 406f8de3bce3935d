// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Credential Vault
//!
//! Authenticated symmetric encryption of connection secrets with a single
//! process-wide AES-256-GCM key.
//!
//! Blobs are self-contained text of the form `hex(iv):hex(tag):hex(ciphertext)`
//! with a fresh random 16-byte IV per call, so encrypting the same plaintext
//! twice never yields the same blob. The GCM tag makes tampering or a wrong
//! key detectable; no partial plaintext is ever returned.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Keep credentials encrypted at rest
//! - **Integration:** Connection Registry → CredentialVault

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// AES-256-GCM with a 16-byte IV.
type VaultCipher = AesGcm<Aes256, U16>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Encryption key must be {expected} hex characters, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Encryption key is not valid hex: {0}")]
    InvalidKeyEncoding(String),

    #[error("Malformed ciphertext: {0}")]
    Malformed(String),

    /// Integrity check failed: wrong key or corrupted data.
    #[error("Ciphertext authentication failed")]
    Authentication,

    #[error("Encryption failed")]
    Encryption,

    #[error("Decrypted value is not valid UTF-8")]
    Utf8,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct CredentialVault {
    cipher: VaultCipher,
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Builds the vault from exactly 64 hex characters.
    pub fn from_hex(key_hex: &str) -> Result<Self, VaultError> {
        let key_hex = key_hex.trim();
        if key_hex.len() != KEY_LEN * 2 {
            return Err(VaultError::InvalidKeyLength {
                expected: KEY_LEN * 2,
                actual: key_hex.len(),
            });
        }
        let key = hex::decode(key_hex).map_err(|e| VaultError::InvalidKeyEncoding(e.to_string()))?;
        Self::from_bytes(&key)
    }

    pub fn from_bytes(key: &[u8]) -> Result<Self, VaultError> {
        let cipher = VaultCipher::new_from_slice(key).map_err(|_| VaultError::InvalidKeyLength {
            expected: KEY_LEN * 2,
            actual: key.len() * 2,
        })?;
        Ok(Self { cipher })
    }

    /// Fresh random key, hex encoded.
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut key);
        hex::encode(key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| VaultError::Encryption)?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(&buffer)
        ))
    }

    pub fn decrypt(&self, blob: &str) -> Result<String, VaultError> {
        let segments: Vec<&str> = blob.split(':').collect();
        if segments.len() != 3 {
            return Err(VaultError::Malformed(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        }

        let iv = decode_segment(segments[0], "iv")?;
        let tag = decode_segment(segments[1], "tag")?;
        let mut buffer = decode_segment(segments[2], "ciphertext")?;

        if iv.len() != IV_LEN {
            return Err(VaultError::Malformed(format!("iv must be {} bytes", IV_LEN)));
        }
        if tag.len() != TAG_LEN {
            return Err(VaultError::Malformed(format!("tag must be {} bytes", TAG_LEN)));
        }

        self.cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(&iv),
                b"",
                &mut buffer,
                GenericArray::from_slice(&tag),
            )
            .map_err(|_| VaultError::Authentication)?;

        String::from_utf8(buffer).map_err(|_| VaultError::Utf8)
    }

    pub fn encrypt_json<T: Serialize>(&self, value: &T) -> Result<String, VaultError> {
        self.encrypt(&serde_json::to_string(value)?)
    }

    pub fn decrypt_json<T: DeserializeOwned>(&self, blob: &str) -> Result<T, VaultError> {
        Ok(serde_json::from_str(&self.decrypt(blob)?)?)
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, VaultError> {
    hex::decode(segment).map_err(|e| VaultError::Malformed(format!("{}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vault() -> CredentialVault {
        CredentialVault::from_hex(&"ab".repeat(32)).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let vault = vault();
        for plaintext in ["", "postgres", "pässwörd with spaces & symbols;:"] {
            let blob = vault.encrypt(plaintext).unwrap();
            assert_eq!(vault.decrypt(&blob).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let vault = vault();
        let options = json!({"sslmode": "require", "application_name": "dashforge", "n": [1, 2]});
        let blob = vault.encrypt_json(&options).unwrap();
        let back: serde_json::Value = vault.decrypt_json(&blob).unwrap();
        assert_eq!(back, options);
    }

    #[test]
    fn test_encryption_is_not_deterministic() {
        let vault = vault();
        let a = vault.encrypt("secret").unwrap();
        let b = vault.encrypt("secret").unwrap();
        assert_ne!(a, b);
        assert_eq!(vault.decrypt(&a).unwrap(), "secret");
        assert_eq!(vault.decrypt(&b).unwrap(), "secret");
    }

    #[test]
    fn test_blob_format() {
        let blob = vault().encrypt("abc").unwrap();
        let parts: Vec<&str> = blob.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 32);
        assert_eq!(parts[1].len(), TAG_LEN * 2);
        assert_eq!(parts[2].len(), 6);
    }

    #[test]
    fn test_tampering_is_detected() {
        let vault = vault();
        let blob = vault.encrypt("reporting-user").unwrap();
        let parts: Vec<&str> = blob.split(':').collect();

        for segment in 0..3 {
            let mut bytes = hex::decode(parts[segment]).unwrap();
            bytes[0] ^= 0x01;
            let mut tampered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
            tampered[segment] = hex::encode(bytes);
            let result = vault.decrypt(&tampered.join(":"));
            assert!(
                matches!(result, Err(VaultError::Authentication)),
                "segment {} tamper not detected",
                segment
            );
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = vault().encrypt("secret").unwrap();
        let other = CredentialVault::from_hex(&"cd".repeat(32)).unwrap();
        assert!(matches!(other.decrypt(&blob), Err(VaultError::Authentication)));
    }

    #[test]
    fn test_malformed_blobs() {
        let vault = vault();
        assert!(matches!(vault.decrypt("abc"), Err(VaultError::Malformed(_))));
        assert!(matches!(vault.decrypt("a:b:c:d"), Err(VaultError::Malformed(_))));
        assert!(matches!(vault.decrypt("zz:zz:zz"), Err(VaultError::Malformed(_))));
        assert!(matches!(vault.decrypt("00:00:00"), Err(VaultError::Malformed(_))));
    }

    #[test]
    fn test_key_validation() {
        assert!(matches!(
            CredentialVault::from_hex("abcd"),
            Err(VaultError::InvalidKeyLength { actual: 4, .. })
        ));
        assert!(matches!(
            CredentialVault::from_hex(&"zz".repeat(32)),
            Err(VaultError::InvalidKeyEncoding(_))
        ));
        assert!(matches!(
            CredentialVault::from_hex(&"ab".repeat(33)),
            Err(VaultError::InvalidKeyLength { .. })
        ));
        assert!(CredentialVault::from_hex(&CredentialVault::generate_key()).is_ok());
    }
}
