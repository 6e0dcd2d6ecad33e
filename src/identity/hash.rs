// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Two-level SHA-256 node identity.
//!
//! Each fingerprint field is hashed on its own, the five hex digests are
//! concatenated in a fixed order (hostname, platform, cpu, ram, disk) and the
//! concatenation is hashed again. Numeric fields are hashed as decimal strings.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::fingerprint::HostFingerprint;

/// Length of a rendered identity (SHA-256, lowercase hex).
pub const IDENTITY_HEX_LEN: usize = 64;

/// Opaque, stable identity of this node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct IdentityHash(String);

impl IdentityHash {
    /// Derive the identity of a fingerprint.
    pub fn of(fingerprint: &HostFingerprint) -> Self {
        let ram = fingerprint.ram_mb.to_string();
        let disk = fingerprint.disk_mb.to_string();

        let fields = [
            fingerprint.hostname.as_str(),
            fingerprint.platform.as_str(),
            fingerprint.cpu_model.as_str(),
            ram.as_str(),
            disk.as_str(),
        ];

        let mut combined = String::with_capacity(IDENTITY_HEX_LEN * fields.len());
        for field in fields {
            combined.push_str(&hash_value(field));
        }

        Self(hash_value(&combined))
    }

    /// The lowercase hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentityHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// SHA-256 of a string, rendered as lowercase hex.
pub fn hash_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    alloy::hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> HostFingerprint {
        HostFingerprint {
            hostname: "node-01".to_string(),
            platform: "ubuntu".to_string(),
            cpu_model: "AMD EPYC 7763 64-Core Processor".to_string(),
            ram_mb: 15_987,
            disk_mb: 0,
        }
    }

    #[test]
    fn hash_value_matches_known_digest() {
        // sha256("abc")
        assert_eq!(
            hash_value("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn identity_is_two_level_digest_in_field_order() {
        let fp = sample();
        let expected = hash_value(&format!(
            "{}{}{}{}{}",
            hash_value("node-01"),
            hash_value("ubuntu"),
            hash_value("AMD EPYC 7763 64-Core Processor"),
            hash_value("15987"),
            hash_value("0"),
        ));

        assert_eq!(IdentityHash::of(&fp).as_str(), expected);
    }

    #[test]
    fn identity_is_lowercase_hex_of_fixed_length() {
        let id = IdentityHash::of(&sample());
        assert_eq!(id.as_str().len(), IDENTITY_HEX_LEN);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn degraded_fingerprint_still_hashes() {
        let id = IdentityHash::of(&HostFingerprint::default());
        assert_eq!(id.as_str().len(), IDENTITY_HEX_LEN);
    }

    #[test]
    fn swapping_fields_changes_identity() {
        let a = sample();
        let mut b = sample();
        std::mem::swap(&mut b.hostname, &mut b.platform);
        assert_ne!(IdentityHash::of(&a), IdentityHash::of(&b));
    }

    fn fingerprint_strategy() -> impl Strategy<Value = HostFingerprint> {
        (
            "[a-z0-9-]{0,24}",
            "[a-z]{0,12}",
            "[ -~]{0,48}",
            any::<u64>(),
            any::<u64>(),
        )
            .prop_map(|(hostname, platform, cpu_model, ram_mb, disk_mb)| HostFingerprint {
                hostname,
                platform,
                cpu_model,
                ram_mb,
                disk_mb,
            })
    }

    proptest! {
        #[test]
        fn equal_fingerprints_hash_equal(fp in fingerprint_strategy()) {
            let copy = fp.clone();
            prop_assert_eq!(IdentityHash::of(&fp), IdentityHash::of(&copy));
        }

        #[test]
        fn perturbed_fingerprints_hash_differently(
            fp in fingerprint_strategy(),
            field in 0usize..5,
            suffix in "[a-z]{1,8}",
            delta in 1u64..1_000_000,
        ) {
            let mut other = fp.clone();
            match field {
                0 => other.hostname.push_str(&suffix),
                1 => other.platform.push_str(&suffix),
                2 => other.cpu_model.push_str(&suffix),
                3 => other.ram_mb = other.ram_mb.wrapping_add(delta),
                _ => other.disk_mb = other.disk_mb.wrapping_add(delta),
            }
            prop_assert_ne!(IdentityHash::of(&fp), IdentityHash::of(&other));
        }
    }
}
