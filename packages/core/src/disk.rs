//! Block device metadata using lsblk.
//!
//! This module describes an attached device and its partitions from
//! `lsblk --json` output and decides which partitions are worth mounting.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::executor::ExecutionContext;

/// Columns requested from lsblk.
const LSBLK_COLUMNS: &str = "NAME,PATH,SIZE,TYPE,FSTYPE,LABEL,UUID";

/// A block device (or partition) as reported by lsblk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name (e.g., "loop3", "loop3p1").
    pub name: String,
    /// Full device path (e.g., "/dev/loop3p1"). Older lsblk lacks this column.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
    /// Device type ("loop", "part", ...).
    #[serde(rename = "type", default)]
    pub device_type: Option<String>,
    /// Filesystem type, if a signature was found.
    #[serde(default)]
    pub fstype: Option<String>,
    /// Volume label, if set.
    #[serde(default)]
    pub label: Option<String>,
    /// Filesystem UUID.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Partitions of this device.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DeviceInfo>,
}

impl DeviceInfo {
    /// Returns the device node path, falling back to `/dev/<name>`.
    pub fn device_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("/dev/{}", self.name)))
    }

    /// Returns true if this device is a partition.
    pub fn is_partition(&self) -> bool {
        self.device_type.as_deref() == Some("part")
    }

    /// Returns true if the device has a partition table or a bare filesystem.
    pub fn has_layout(&self) -> bool {
        !self.children.is_empty() || self.fstype.is_some()
    }

    /// Partitions of at least `min_size` bytes, in lsblk order.
    ///
    /// A device without partitions that carries a filesystem itself is
    /// returned as its own single partition, subject to the same size check.
    pub fn partitions(&self, min_size: u64) -> Vec<PathBuf> {
        if self.children.is_empty() {
            if self.fstype.is_some() && self.size.unwrap_or(0) >= min_size {
                return vec![self.device_path()];
            }
            return Vec::new();
        }

        let mut partitions = Vec::new();
        collect_partitions(&self.children, min_size, &mut partitions);
        partitions
    }

    /// Metadata dump used in reports.
    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// Recursively collect partitions, including nested ones (e.g., extended partitions).
fn collect_partitions(devices: &[DeviceInfo], min_size: u64, partitions: &mut Vec<PathBuf>) {
    for dev in devices {
        if dev.is_partition() && dev.size.unwrap_or(0) >= min_size {
            partitions.push(dev.device_path());
        }

        collect_partitions(&dev.children, min_size, partitions);
    }
}

/// Raw JSON structure from lsblk output.
#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<DeviceInfo>,
}

/// Parses `lsblk --json` output for a single device.
pub fn parse_lsblk(json: &str) -> Result<DeviceInfo> {
    let output: LsblkOutput = serde_json::from_str(json).map_err(|e| Error::LsblkParse {
        message: e.to_string(),
    })?;

    output
        .blockdevices
        .into_iter()
        .next()
        .ok_or_else(|| Error::LsblkParse {
            message: "no block devices in output".to_string(),
        })
}

/// Describes a device by calling `lsblk --json --bytes` on it.
pub fn describe_device(ctx: &ExecutionContext, device: &Path) -> Result<DeviceInfo> {
    let device = device.to_string_lossy();
    let stdout = ctx.run_privileged_checked(
        "lsblk",
        &["--json", "--bytes", "--output", LSBLK_COLUMNS, &device],
    )?;

    parse_lsblk(&stdout)
}
