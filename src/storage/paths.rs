// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the agent's on-disk layout.

use std::path::{Path, PathBuf};

/// Default data directory, relative to the working directory.
pub const DATA_ROOT: &str = "./data";

/// File name of the sealed identity artifact.
pub const IDENTITY_ARTIFACT: &str = "sysdata.bin";

/// Storage path utilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all agent data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the sealed identity artifact.
    pub fn identity_artifact(&self) -> PathBuf {
        self.root.join(IDENTITY_ARTIFACT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_root() {
        let paths = StoragePaths::default();
        assert_eq!(paths.root(), Path::new(DATA_ROOT));
    }

    #[test]
    fn identity_artifact_is_under_root() {
        let paths = StoragePaths::new("/var/lib/agent");
        assert_eq!(
            paths.identity_artifact(),
            PathBuf::from("/var/lib/agent/sysdata.bin")
        );
    }
}
