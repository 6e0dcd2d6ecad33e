// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Symmetric vault for sealing the node identity at rest.
//!
//! ## Format
//!
//! ```text
//! MAGIC ("NLV1", 4 bytes) || nonce (12 bytes) || ciphertext || tag (16 bytes)
//! ```
//!
//! AES-256-GCM via `ring`. The magic header is bound as associated data, so a
//! header swap fails authentication like any other tampering. A fresh random
//! nonce is drawn for every seal.
//!
//! ## Key custody
//!
//! The vault never stores or derives keys. Callers own the 32-byte key; losing
//! it makes the artifact unrecoverable.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

/// Required key length in bytes.
pub const KEY_LEN: usize = 32;

/// Authentication tag length appended by AES-GCM.
pub const TAG_LEN: usize = 16;

/// Artifact header, also used as AEAD associated data.
const MAGIC: &[u8; 4] = b"NLV1";

/// Errors returned by vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Key has the wrong length; raised before any cryptographic work.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    /// Key is not valid hex.
    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    /// Wrong key, tampered artifact, or truncated/foreign file.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The system RNG could not produce a nonce or key.
    #[error("random generator failure")]
    Random,

    /// Sealed payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// A 32-byte vault key.
#[derive(Clone, PartialEq, Eq)]
pub struct VaultKey([u8; KEY_LEN]);

impl VaultKey {
    /// Generate a random key from the system RNG.
    pub fn generate() -> VaultResult<Self> {
        let mut bytes = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| VaultError::Random)?;
        Ok(Self(bytes))
    }

    /// Build a key from raw bytes, validating the length.
    pub fn from_slice(bytes: &[u8]) -> VaultResult<Self> {
        let array: [u8; KEY_LEN] = bytes.try_into().map_err(|_| VaultError::InvalidKey {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    /// Parse a hex-encoded key (optional `0x` prefix).
    pub fn from_hex(encoded: &str) -> VaultResult<Self> {
        let bytes = alloy::hex::decode(encoded.trim())
            .map_err(|e| VaultError::InvalidKeyEncoding(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey(<redacted>)")
    }
}

/// Ciphertext plus the nonce needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the authentication tag appended.
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Serialize to the on-disk artifact format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MAGIC.len() + NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the on-disk artifact format.
    pub fn from_bytes(bytes: &[u8]) -> VaultResult<Self> {
        if bytes.len() < MAGIC.len() + NONCE_LEN + TAG_LEN {
            return Err(VaultError::Decryption("artifact truncated".to_string()));
        }

        let (magic, rest) = bytes.split_at(MAGIC.len());
        if magic != MAGIC {
            return Err(VaultError::Decryption("unrecognized artifact header".to_string()));
        }

        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);

        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

fn aead_key(key: &[u8]) -> VaultResult<LessSafeKey> {
    if key.len() != KEY_LEN {
        return Err(VaultError::InvalidKey {
            expected: KEY_LEN,
            actual: key.len(),
        });
    }

    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| VaultError::InvalidKey {
        expected: KEY_LEN,
        actual: key.len(),
    })?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn seal(plaintext: &[u8], key: &[u8]) -> VaultResult<EncryptedBlob> {
    let key = aead_key(key)?;

    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| VaultError::Random)?;

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce),
        Aad::from(MAGIC),
        &mut in_out,
    )
    .map_err(|_| VaultError::Random)?;

    Ok(EncryptedBlob {
        nonce,
        ciphertext: in_out,
    })
}

/// Authenticate and decrypt a blob.
pub fn open(blob: &EncryptedBlob, key: &[u8]) -> VaultResult<Vec<u8>> {
    let key = aead_key(key)?;

    let mut in_out = blob.ciphertext.clone();
    let plaintext = key
        .open_in_place(
            Nonce::assume_unique_for_key(blob.nonce),
            Aad::from(MAGIC),
            &mut in_out,
        )
        .map_err(|_| {
            VaultError::Decryption("authentication failed (wrong key or tampered data)".to_string())
        })?;

    Ok(plaintext.to_vec())
}

/// Seal `plaintext` and write it to `path`, replacing any previous artifact.
pub fn encrypt_to_file(
    path: impl AsRef<Path>,
    plaintext: &[u8],
    key: &[u8],
) -> VaultResult<EncryptedBlob> {
    let blob = seal(plaintext, key)?;
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    // Write to temp file first, then rename for atomicity
    let temp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(&blob.to_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;

    tracing::debug!(path = %path.display(), bytes = blob.ciphertext.len(), "Vault artifact written");
    Ok(blob)
}

/// Read the artifact at `path` and decrypt it.
pub fn decrypt_file(path: impl AsRef<Path>, key: &[u8]) -> VaultResult<Vec<u8>> {
    // Validate the key before touching the artifact
    aead_key(key)?;

    let bytes = fs::read(path.as_ref())?;
    let blob = EncryptedBlob::from_bytes(&bytes)?;
    open(&blob, key)
}
