//! Mount operations module.
//!
//! This module creates scratch mount points and mounts partitions read-only,
//! picking options that keep journaling filesystems from replaying their log.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};
use crate::executor::ExecutionContext;

/// Prefix of every mount point directory created by this crate.
pub const MOUNT_POINT_PREFIX: &str = "mount-debug-";

/// Creates a fresh, uniquely named mount point directory under `root`.
pub fn create_mount_point(root: &Path) -> Result<PathBuf> {
    if !root.exists() {
        fs::create_dir_all(root).mount_point_context(root)?;
    }

    let dir = tempfile::Builder::new()
        .prefix(MOUNT_POINT_PREFIX)
        .tempdir_in(root)
        .mount_point_context(root)?;

    Ok(dir.keep())
}

/// Removes an (unmounted) mount point directory.
pub fn remove_mount_point(path: &Path) -> Result<()> {
    fs::remove_dir(path).map_err(|e| Error::Unmount {
        path: path.to_path_buf(),
        message: format!("failed to remove mount point: {}", e),
    })
}

/// Returns the `-o` options used to mount a filesystem read-only.
///
/// ext3/ext4 and xfs would replay their journal even on a read-only mount,
/// which fails on a read-only loop device.
pub fn mount_options(fstype: Option<&str>) -> &'static str {
    match fstype {
        Some("ext3" | "ext4") => "ro,noload",
        Some("xfs") => "ro,norecovery",
        _ => "ro",
    }
}

/// Detects the filesystem type of a partition with `blkid`.
///
/// Returns `None` when blkid finds no signature or cannot run.
pub fn detect_fstype(ctx: &ExecutionContext, partition: &Path) -> Option<String> {
    let partition = partition.to_string_lossy();
    ctx.run_privileged_checked("blkid", &["-o", "value", "-s", "TYPE", &partition])
        .ok()
        .map(|stdout| stdout.trim().to_string())
        .filter(|fstype| !fstype.is_empty())
}

/// Mounts a partition read-only to the specified mount point.
pub fn mount_partition(ctx: &ExecutionContext, partition: &Path, mount_point: &Path) -> Result<()> {
    let fstype = detect_fstype(ctx, partition);
    let options = mount_options(fstype.as_deref());

    tracing::debug!(
        partition = %partition.display(),
        mount_point = %mount_point.display(),
        fstype = fstype.as_deref().unwrap_or("unknown"),
        options,
        "mounting partition"
    );

    let source = partition.to_string_lossy();
    let target = mount_point.to_string_lossy();
    ctx.run_privileged_checked("mount", &["-o", options, &source, &target])
        .map(|_| ())
}

/// Unmounts the specified mount point.
pub fn unmount(ctx: &ExecutionContext, mount_point: &Path) -> Result<()> {
    let target = mount_point.to_string_lossy();
    ctx.run_privileged_checked("umount", &[&*target])
        .map(|_| ())
        .map_err(|e| Error::Unmount {
            path: mount_point.to_path_buf(),
            message: e.to_string(),
        })
}
