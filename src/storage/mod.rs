// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! On-disk state of the agent. Only the sealed identity artifact lives here.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   sysdata.bin     # AES-256-GCM sealed identity (see `vault`)
//! ```
//!
//! The vault key is never written under `DATA_DIR`.

pub mod paths;
pub mod vault;

pub use paths::StoragePaths;
pub use vault::{
    decrypt_file, encrypt_to_file, open, seal, EncryptedBlob, VaultError, VaultKey, VaultResult,
};
