// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::enums::FullBitMode;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Config {
    /// Which physical device to attach to and how strictly to vet it.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Protocol knobs: quirk handling, query sizes, diagnostics.
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Per-command-family deadlines.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Device selection settings. Matching is advisory: with `force` set, the
/// first enumerated changer is taken regardless of identity.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct DeviceConfig {
    #[serde(default, rename = "Vendor")]
    /// Expected vendor identification (INQUIRY bytes 8..16), if pinned.
    pub vendor: Option<String>,

    #[serde(default, rename = "Product")]
    /// Expected product identification (INQUIRY bytes 16..32), if pinned.
    pub product: Option<String>,

    #[serde(default, rename = "Force")]
    /// Bypass the vendor/product match and the readiness probe.
    pub force: bool,

    #[serde(default, rename = "SkipReadyProbe")]
    /// Skip the automatic TEST UNIT READY issued right after open.
    pub skip_ready_probe: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ProtocolConfig {
    #[serde(default, rename = "FullBit")]
    /// Which flag bit encodes "element holds media".
    pub full_bit: FullBitMode,

    #[serde(default = "default_storage_page_step", rename = "StoragePageStep")]
    /// Upper bound of elements requested per scoped storage query; devices
    /// in this family return at most ~40 per exchange.
    pub storage_page_step: u16,

    #[serde(default = "default_topology_alloc", rename = "TopologyAllocation")]
    /// Allocation length for the all-kinds topology query.
    pub topology_alloc: u32,

    #[serde(default = "default_status_alloc", rename = "StatusAllocation")]
    /// Allocation length for two-element status lookups.
    pub status_alloc: u32,

    #[serde(default, rename = "DumpRawResponses")]
    /// Log raw response buffers at debug level on decode trouble.
    pub dump_raw: bool,
}

fn default_storage_page_step() -> u16 {
    40
}

fn default_topology_alloc() -> u32 {
    65535
}

fn default_status_alloc() -> u32 {
    4096
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            full_bit: FullBitMode::default(),
            storage_page_step: default_storage_page_step(),
            topology_alloc: default_topology_alloc(),
            status_alloc: default_status_alloc(),
            dump_raw: false,
        }
    }
}

/// Deadlines per command family, expressed as seconds in YAML.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimeoutConfig {
    #[serde(default = "default_command_timeout", rename = "Command", with = "serde_secs")]
    /// INQUIRY / TEST UNIT READY / MODE SENSE / LOG SENSE / REPORT LUNS.
    pub command: Duration,

    #[serde(default = "default_status_timeout", rename = "Status", with = "serde_secs")]
    /// Targeted READ ELEMENT STATUS lookups.
    pub status: Duration,

    #[serde(
        default = "default_topology_timeout",
        rename = "Topology",
        with = "serde_secs"
    )]
    /// Full-inventory READ ELEMENT STATUS sweeps.
    pub topology: Duration,

    #[serde(default = "default_motion_timeout", rename = "Motion", with = "serde_secs")]
    /// MOVE MEDIUM and INITIALIZE ELEMENT STATUS; the picker arm is slow.
    pub motion: Duration,

    #[serde(
        default = "default_mount_timeout",
        rename = "MountWait",
        with = "serde_secs"
    )]
    /// How long `load_verbose` waits for the host to mount the medium.
    pub mount_wait: Duration,
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_status_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_topology_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_motion_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_mount_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command: default_command_timeout(),
            status: default_status_timeout(),
            topology: default_topology_timeout(),
            motion: default_motion_timeout(),
            mount_wait: default_mount_timeout(),
        }
    }
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(&path).with_context(|| {
            format!("failed to read config file {:?}", path.as_ref())
        })?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            self.protocol.storage_page_step >= 1,
            "StoragePageStep must be >= 1"
        );

        // READ ELEMENT STATUS carries a 24-bit allocation length.
        ensure!(
            self.protocol.topology_alloc <= 0x00FF_FFFF,
            "TopologyAllocation must fit 24 bits"
        );
        ensure!(
            self.protocol.status_alloc <= 0x00FF_FFFF,
            "StatusAllocation must fit 24 bits"
        );
        ensure!(
            self.protocol.topology_alloc >= 8 && self.protocol.status_alloc >= 8,
            "allocation lengths must cover the 8-byte report header"
        );

        for (name, d) in [
            ("Command", self.timeouts.command),
            ("Status", self.timeouts.status),
            ("Topology", self.timeouts.topology),
            ("Motion", self.timeouts.motion),
        ] {
            ensure!(!d.is_zero(), "{name} timeout must be non-zero");
        }

        Ok(())
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
