// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Host fingerprint collection.
//!
//! Reads static host facts (hostname, platform, CPU model, total memory and
//! total disk). A failing probe never aborts collection: its field falls back
//! to an empty string or zero and the failure is logged.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};
use utoipa::ToSchema;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Normalized record of host attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HostFingerprint {
    pub hostname: String,
    pub platform: String,
    pub cpu_model: String,
    pub ram_mb: u64,
    pub disk_mb: u64,
}

/// A probe could not read its attribute; the field was defaulted.
#[derive(Debug, Clone, thiserror::Error)]
#[error("collection degraded for {field}: {reason}")]
pub struct CollectionDegraded {
    pub field: &'static str,
    pub reason: String,
}

impl CollectionDegraded {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Source of raw host facts.
pub trait HostProbe {
    fn hostname(&self) -> Result<String, CollectionDegraded>;
    fn platform(&self) -> Result<String, CollectionDegraded>;
    fn cpu_model(&self) -> Result<String, CollectionDegraded>;
    fn total_memory_bytes(&self) -> Result<u64, CollectionDegraded>;
    fn total_disk_bytes(&self) -> Result<u64, CollectionDegraded>;
}

impl HostFingerprint {
    /// Collect the fingerprint of the current host.
    pub fn collect() -> Self {
        Self::collect_with(&SystemProbe::new())
    }

    /// Collect using the given probe, defaulting every field that fails.
    pub fn collect_with(probe: &impl HostProbe) -> Self {
        Self {
            hostname: degrade(probe.hostname()),
            platform: degrade(probe.platform()),
            cpu_model: degrade(probe.cpu_model()),
            ram_mb: degrade(probe.total_memory_bytes()) / BYTES_PER_MB,
            disk_mb: degrade(probe.total_disk_bytes()) / BYTES_PER_MB,
        }
    }
}

impl fmt::Display for HostFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.hostname, self.platform, self.cpu_model, self.ram_mb, self.disk_mb
        )
    }
}

fn degrade<T: Default>(result: Result<T, CollectionDegraded>) -> T {
    result.unwrap_or_else(|e| {
        tracing::warn!(field = e.field, reason = %e.reason, "Host probe failed, field defaulted");
        T::default()
    })
}

// =============================================================================
// System Probe
// =============================================================================

/// Probe backed by the running operating system through `sysinfo`.
///
/// Memory, CPU and disk facts are refreshed once when the probe is created.
pub struct SystemProbe {
    system: System,
    disks: Disks,
}

impl SystemProbe {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::nothing())
                .with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SystemProbe {
    fn hostname(&self) -> Result<String, CollectionDegraded> {
        System::host_name()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| CollectionDegraded::new("hostname", "hostname unavailable"))
    }

    fn platform(&self) -> Result<String, CollectionDegraded> {
        // Distribution ID; sysinfo falls back to the OS family
        let id = System::distribution_id();
        if id.is_empty() {
            return Err(CollectionDegraded::new("platform", "distribution unavailable"));
        }
        Ok(id)
    }

    fn cpu_model(&self) -> Result<String, CollectionDegraded> {
        self.system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .ok_or_else(|| CollectionDegraded::new("cpu", "no CPU brand reported"))
    }

    fn total_memory_bytes(&self) -> Result<u64, CollectionDegraded> {
        match self.system.total_memory() {
            0 => Err(CollectionDegraded::new("ram", "total memory unavailable")),
            bytes => Ok(bytes),
        }
    }

    fn total_disk_bytes(&self) -> Result<u64, CollectionDegraded> {
        let disks = self.disks.list();
        if disks.is_empty() {
            return Err(CollectionDegraded::new("disk", "no disks reported"));
        }

        // Root filesystem when there is one, else every fixed disk.
        let total = match disks.iter().find(|d| d.mount_point() == Path::new("/")) {
            Some(root) => root.total_space(),
            None => disks
                .iter()
                .filter(|d| !d.is_removable())
                .map(|d| d.total_space())
                .sum(),
        };

        if total == 0 {
            return Err(CollectionDegraded::new("disk", "disk size unavailable"));
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe {
        fail_disk: bool,
        fail_all: bool,
    }

    impl FixedProbe {
        fn check(&self, field: &'static str) -> Result<(), CollectionDegraded> {
            if self.fail_all || (self.fail_disk && field == "disk") {
                Err(CollectionDegraded::new(field, "probe unavailable"))
            } else {
                Ok(())
            }
        }
    }

    impl HostProbe for FixedProbe {
        fn hostname(&self) -> Result<String, CollectionDegraded> {
            self.check("hostname").map(|_| "node-01".to_string())
        }
        fn platform(&self) -> Result<String, CollectionDegraded> {
            self.check("platform").map(|_| "debian".to_string())
        }
        fn cpu_model(&self) -> Result<String, CollectionDegraded> {
            self.check("cpu").map(|_| "Intel(R) Xeon(R) CPU".to_string())
        }
        fn total_memory_bytes(&self) -> Result<u64, CollectionDegraded> {
            self.check("ram").map(|_| 8 * 1024 * BYTES_PER_MB + 123)
        }
        fn total_disk_bytes(&self) -> Result<u64, CollectionDegraded> {
            self.check("disk").map(|_| 256 * 1024 * BYTES_PER_MB)
        }
    }

    #[test]
    fn collects_all_fields_in_megabytes() {
        let fp = HostFingerprint::collect_with(&FixedProbe {
            fail_disk: false,
            fail_all: false,
        });
        assert_eq!(fp.hostname, "node-01");
        assert_eq!(fp.platform, "debian");
        assert_eq!(fp.cpu_model, "Intel(R) Xeon(R) CPU");
        assert_eq!(fp.ram_mb, 8192);
        assert_eq!(fp.disk_mb, 262_144);
    }

    #[test]
    fn missing_disk_reading_is_defaulted() {
        let fp = HostFingerprint::collect_with(&FixedProbe {
            fail_disk: true,
            fail_all: false,
        });
        assert_eq!(fp.disk_mb, 0);
        assert_eq!(fp.hostname, "node-01");
    }

    #[test]
    fn total_probe_failure_yields_empty_fingerprint() {
        let fp = HostFingerprint::collect_with(&FixedProbe {
            fail_disk: false,
            fail_all: true,
        });
        assert_eq!(fp, HostFingerprint::default());
    }

    #[test]
    fn display_is_comma_joined_record() {
        let fp = HostFingerprint {
            hostname: "h".into(),
            platform: "p".into(),
            cpu_model: "c".into(),
            ram_mb: 1,
            disk_mb: 2,
        };
        assert_eq!(fp.to_string(), "h,p,c,1,2");
    }

    #[test]
    fn system_probe_never_panics() {
        let fp = HostFingerprint::collect();
        // Whatever the host, collection returns a usable record.
        assert!(fp
            .to_string()
            .ends_with(&format!(",{},{}", fp.ram_mb, fp.disk_mb)));
    }

    #[test]
    fn system_probe_reports_platform_and_memory() {
        let probe = SystemProbe::new();
        assert!(!probe.platform().unwrap().is_empty());
        assert!(probe.total_memory_bytes().unwrap() > 0);
    }
}
