// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Node Identity
//!
//! Fingerprint → hash → sealed artifact.
//!
//! At startup the agent collects the host fingerprint, derives the
//! [`IdentityHash`], seals both into the vault artifact and immediately opens
//! the artifact again to prove the key and file round-trip.

pub mod fingerprint;
pub mod hash;

use std::io::ErrorKind;

use serde::{Deserialize, Serialize};

pub use fingerprint::{CollectionDegraded, HostFingerprint, HostProbe, SystemProbe};
pub use hash::{hash_value, IdentityHash};

use crate::storage::{vault, StoragePaths, VaultError, VaultKey, VaultResult};

/// The sealed identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub fingerprint: HostFingerprint,
    pub identity: IdentityHash,
}

impl NodeIdentity {
    /// Derive the identity of a fingerprint.
    pub fn from_fingerprint(fingerprint: HostFingerprint) -> Self {
        let identity = IdentityHash::of(&fingerprint);
        Self {
            fingerprint,
            identity,
        }
    }

    /// Collect this host's identity, seal it and verify the artifact.
    pub fn establish(paths: &StoragePaths, key: &VaultKey) -> VaultResult<Self> {
        Self::establish_from(HostFingerprint::collect(), paths, key)
    }

    /// Seal an already collected fingerprint and verify the artifact.
    pub fn establish_from(
        fingerprint: HostFingerprint,
        paths: &StoragePaths,
        key: &VaultKey,
    ) -> VaultResult<Self> {
        let node = Self::from_fingerprint(fingerprint);
        tracing::info!(
            record = %node.fingerprint,
            identity = %node.identity,
            "Host fingerprint collected"
        );

        let artifact = paths.identity_artifact();
        let payload = serde_json::to_vec(&node)?;
        vault::encrypt_to_file(&artifact, &payload, key.as_bytes())?;

        let reopened = Self::load(paths, key)?;
        if reopened != node {
            return Err(VaultError::Decryption(
                "sealed identity does not match collected identity".to_string(),
            ));
        }

        tracing::info!(path = %artifact.display(), "Node identity sealed");
        Ok(node)
    }

    /// Open a previously sealed identity.
    pub fn load(paths: &StoragePaths, key: &VaultKey) -> VaultResult<Self> {
        let plaintext = vault::decrypt_file(paths.identity_artifact(), key.as_bytes())?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Check a previously sealed identity before it is overwritten.
    ///
    /// A missing artifact is a first run and returns `Ok(None)`. Any other
    /// failure is an error when `persistent_key` is set, since that key should
    /// open the artifact. With a per-run key the old artifact cannot be opened
    /// and is reported as orphaned.
    pub fn reconcile(
        paths: &StoragePaths,
        key: &VaultKey,
        persistent_key: bool,
        current: &HostFingerprint,
    ) -> VaultResult<Option<Self>> {
        let artifact = paths.identity_artifact();

        match Self::load(paths, key) {
            Ok(previous) => {
                if previous.identity != IdentityHash::of(current) {
                    tracing::warn!(
                        previous = %previous.identity,
                        "Host fingerprint changed since the identity was last sealed"
                    );
                }
                Ok(Some(previous))
            }
            Err(VaultError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if persistent_key => {
                tracing::error!(
                    path = %artifact.display(),
                    error = %e,
                    "Sealed identity cannot be opened with the configured key"
                );
                Err(e)
            }
            Err(e) => {
                tracing::warn!(
                    path = %artifact.display(),
                    error = %e,
                    "Previous sealed identity is orphaned by the per-run key and will be replaced"
                );
                Ok(None)
            }
        }
    }
}
