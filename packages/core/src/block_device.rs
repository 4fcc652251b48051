//! Loop-device backed block device handle.
//!
//! [`BlockDevice`] owns everything acquired for one image: the loop device
//! node, its partitions and the mount points created for them. Transitions
//! happen only through [`BlockDevice::setup`], [`BlockDevice::mount`] and
//! [`BlockDevice::umount`], and dropping the handle releases whatever is
//! still held.

use std::path::{Path, PathBuf};

use crate::disk::{self, DeviceInfo};
use crate::error::{Error, PartitionFailure, Result};
use crate::executor::ExecutionContext;
use crate::mount;

/// OS operations a [`BlockDevice`] is built on.
pub trait DeviceOps {
    /// Maps an image file to a new device node and scans its partition table.
    fn attach(&self, image: &Path) -> Result<PathBuf>;

    /// Describes the device node and its partitions.
    fn describe(&self, device: &Path) -> Result<DeviceInfo>;

    /// Creates a fresh, empty mount point directory.
    fn create_mount_point(&self) -> Result<PathBuf>;

    /// Mounts a partition read-only.
    fn mount(&self, partition: &Path, mount_point: &Path) -> Result<()>;

    /// Unmounts a mount point.
    fn unmount(&self, mount_point: &Path) -> Result<()>;

    /// Removes a mount point directory created by `create_mount_point`.
    fn remove_mount_point(&self, mount_point: &Path) -> Result<()>;

    /// Releases the device node mapping.
    fn detach(&self, device: &Path) -> Result<()>;
}

impl<T: DeviceOps + ?Sized> DeviceOps for &T {
    fn attach(&self, image: &Path) -> Result<PathBuf> {
        (**self).attach(image)
    }

    fn describe(&self, device: &Path) -> Result<DeviceInfo> {
        (**self).describe(device)
    }

    fn create_mount_point(&self) -> Result<PathBuf> {
        (**self).create_mount_point()
    }

    fn mount(&self, partition: &Path, mount_point: &Path) -> Result<()> {
        (**self).mount(partition, mount_point)
    }

    fn unmount(&self, mount_point: &Path) -> Result<()> {
        (**self).unmount(mount_point)
    }

    fn remove_mount_point(&self, mount_point: &Path) -> Result<()> {
        (**self).remove_mount_point(mount_point)
    }

    fn detach(&self, device: &Path) -> Result<()> {
        (**self).detach(device)
    }
}

/// [`DeviceOps`] backed by `losetup`, `lsblk`, `mount` and `umount`.
#[derive(Debug, Clone)]
pub struct SystemDeviceOps {
    ctx: ExecutionContext,
    mount_root: PathBuf,
}

impl SystemDeviceOps {
    pub fn new(ctx: ExecutionContext, mount_root: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            mount_root: mount_root.into(),
        }
    }
}

impl DeviceOps for SystemDeviceOps {
    fn attach(&self, image: &Path) -> Result<PathBuf> {
        let image_arg = image.to_string_lossy();
        let stdout = self
            .ctx
            .run_privileged_checked(
                "losetup",
                &["--find", "--partscan", "--read-only", "--show", &image_arg],
            )
            .map_err(|e| Error::Attachment {
                image: image.to_path_buf(),
                message: e.to_string(),
            })?;

        let device = stdout.trim();
        if device.is_empty() {
            return Err(Error::Attachment {
                image: image.to_path_buf(),
                message: "losetup did not report a device".to_string(),
            });
        }

        // Partition nodes are created asynchronously by udev.
        if let Err(e) = self.ctx.run_privileged_checked("udevadm", &["settle"]) {
            tracing::debug!(error = %e, "udevadm settle failed");
        }

        Ok(PathBuf::from(device))
    }

    fn describe(&self, device: &Path) -> Result<DeviceInfo> {
        disk::describe_device(&self.ctx, device)
    }

    fn create_mount_point(&self) -> Result<PathBuf> {
        mount::create_mount_point(&self.mount_root)
    }

    fn mount(&self, partition: &Path, mount_point: &Path) -> Result<()> {
        mount::mount_partition(&self.ctx, partition, mount_point)
    }

    fn unmount(&self, mount_point: &Path) -> Result<()> {
        mount::unmount(&self.ctx, mount_point)
    }

    fn remove_mount_point(&self, mount_point: &Path) -> Result<()> {
        mount::remove_mount_point(mount_point)
    }

    fn detach(&self, device: &Path) -> Result<()> {
        let device_arg = device.to_string_lossy();
        self.ctx
            .run_privileged_checked("losetup", &["--detach", &device_arg])
            .map(|_| ())
    }
}

/// Attachment state of a [`BlockDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    /// Nothing is held.
    Detached,
    /// A device node is mapped; nothing is mounted.
    Attached,
    /// At least one partition is mounted.
    Mounted,
}

/// Temporary, exclusive access to an image's contents as mountable partitions.
#[derive(Debug)]
pub struct BlockDevice<O: DeviceOps> {
    ops: O,
    device: Option<PathBuf>,
    info: Option<DeviceInfo>,
    partitions: Vec<PathBuf>,
    mount_points: Vec<PathBuf>,
    state: AttachmentState,
}

impl<O: DeviceOps> BlockDevice<O> {
    /// Creates a detached handle.
    pub fn new(ops: O) -> Self {
        Self {
            ops,
            device: None,
            info: None,
            partitions: Vec::new(),
            mount_points: Vec::new(),
            state: AttachmentState::Detached,
        }
    }

    /// Device node the image is mapped to, once attached.
    pub fn device(&self) -> Option<&Path> {
        self.device.as_deref()
    }

    /// lsblk metadata of the device node, once described.
    pub fn info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    /// Partition device nodes that passed the size filter.
    pub fn partitions(&self) -> &[PathBuf] {
        &self.partitions
    }

    /// Mount points currently held by this handle.
    pub fn mount_points(&self) -> &[PathBuf] {
        &self.mount_points
    }

    pub fn state(&self) -> AttachmentState {
        self.state
    }

    /// Maps `image` to a device node and discovers its partitions.
    ///
    /// Partitions smaller than `min_partition_size` bytes are skipped. If
    /// the device is mapped but cannot be described, the mapping is kept so
    /// that [`BlockDevice::umount`] releases it.
    pub fn setup(&mut self, image: &Path, min_partition_size: u64) -> Result<()> {
        if self.state != AttachmentState::Detached {
            return Err(Error::Attachment {
                image: image.to_path_buf(),
                message: "handle is already attached".to_string(),
            });
        }

        let device = self.ops.attach(image)?;
        tracing::info!(image = %image.display(), device = %device.display(), "attached image");
        self.device = Some(device.clone());
        self.state = AttachmentState::Attached;

        let info = self.ops.describe(&device)?;
        if !info.has_layout() {
            self.info = Some(info);
            return Err(Error::Attachment {
                image: image.to_path_buf(),
                message: format!(
                    "{} has no partition table or filesystem",
                    device.display()
                ),
            });
        }

        self.partitions = info.partitions(min_partition_size);
        self.info = Some(info);
        Ok(())
    }

    /// Mounts every discovered partition to its own fresh mount point.
    ///
    /// Every partition is attempted. Failures are collected into
    /// [`Error::Mount`]; partitions that did mount stay mounted until
    /// [`BlockDevice::umount`].
    pub fn mount(&mut self) -> Result<()> {
        if self.state == AttachmentState::Detached {
            return Err(Error::Mount {
                failures: vec![PartitionFailure {
                    partition: PathBuf::new(),
                    message: "no device attached".to_string(),
                }],
            });
        }

        let mut failures = Vec::new();
        let partitions = self.partitions.clone();
        for partition in &partitions {
            if let Some(failure) = self.mount_partition(partition) {
                failures.push(failure);
            }
        }

        if !self.mount_points.is_empty() {
            self.state = AttachmentState::Mounted;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Mount { failures })
        }
    }

    fn mount_partition(&mut self, partition: &Path) -> Option<PartitionFailure> {
        let failure = |e: Error| PartitionFailure {
            partition: partition.to_path_buf(),
            message: e.to_string(),
        };

        let mount_point = match self.ops.create_mount_point() {
            Ok(mount_point) => mount_point,
            Err(e) => return Some(failure(e)),
        };

        match self.ops.mount(partition, &mount_point) {
            Ok(()) => {
                tracing::info!(
                    partition = %partition.display(),
                    mount_point = %mount_point.display(),
                    "mounted partition"
                );
                self.mount_points.push(mount_point);
                None
            }
            Err(e) => {
                if let Err(cleanup) = self.ops.remove_mount_point(&mount_point) {
                    tracing::warn!(error = %cleanup, "failed to remove unused mount point");
                }
                Some(failure(e))
            }
        }
    }

    /// Unmounts everything and releases the device node.
    ///
    /// Safe to call at any point, any number of times. Failures are logged
    /// and never returned.
    pub fn umount(&mut self) {
        for mount_point in self.mount_points.drain(..) {
            match self.ops.unmount(&mount_point) {
                Ok(()) => {
                    if let Err(e) = self.ops.remove_mount_point(&mount_point) {
                        tracing::warn!(error = %e, "failed to remove mount point");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to unmount"),
            }
        }

        if let Some(device) = self.device.take() {
            match self.ops.detach(&device) {
                Ok(()) => tracing::info!(device = %device.display(), "detached device"),
                Err(e) => {
                    tracing::warn!(device = %device.display(), error = %e, "failed to detach device")
                }
            }
        }

        self.partitions.clear();
        self.info = None;
        self.state = AttachmentState::Detached;
    }
}

impl<O: DeviceOps> Drop for BlockDevice<O> {
    fn drop(&mut self) {
        if self.state != AttachmentState::Detached {
            self.umount();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeOps;
    use super::*;

    #[test]
    fn test_setup_discovers_partitions() {
        let ops = FakeOps::default().with_image("/images/disk.raw", 2, 4096);
        let mut bd = BlockDevice::new(&ops);

        bd.setup(Path::new("/images/disk.raw"), 1).unwrap();

        assert_eq!(bd.state(), AttachmentState::Attached);
        assert_eq!(bd.device(), Some(Path::new("/dev/loop0")));
        assert_eq!(
            bd.partitions(),
            &[PathBuf::from("/dev/loop0p1"), PathBuf::from("/dev/loop0p2")]
        );
        assert!(bd.mount_points().is_empty());
    }

    #[test]
    fn test_setup_filters_small_partitions() {
        let ops = FakeOps::default().with_image("/images/disk.raw", 3, 512);
        let mut bd = BlockDevice::new(&ops);

        bd.setup(Path::new("/images/disk.raw"), 1024).unwrap();
        assert!(bd.partitions().is_empty());
    }

    #[test]
    fn test_setup_without_layout_keeps_device_for_cleanup() {
        let ops = FakeOps::default();
        let mut bd = BlockDevice::new(&ops);

        let err = bd.setup(Path::new("/images/blank.raw"), 1).unwrap_err();
        assert!(matches!(err, Error::Attachment { .. }));
        assert_eq!(ops.attached.borrow().len(), 1);

        bd.umount();
        assert!(ops.attached.borrow().is_empty());
        assert_eq!(bd.state(), AttachmentState::Detached);
    }

    #[test]
    fn test_setup_twice_is_rejected() {
        let ops = FakeOps::default().with_image("/images/disk.raw", 1, 4096);
        let mut bd = BlockDevice::new(&ops);

        bd.setup(Path::new("/images/disk.raw"), 1).unwrap();
        assert!(bd.setup(Path::new("/images/disk.raw"), 1).is_err());
        assert_eq!(ops.attached.borrow().len(), 1);
    }

    #[test]
    fn test_mount_and_umount() {
        let ops = FakeOps::default().with_image("/images/disk.raw", 2, 4096);
        let mut bd = BlockDevice::new(&ops);

        bd.setup(Path::new("/images/disk.raw"), 1).unwrap();
        bd.mount().unwrap();

        assert_eq!(bd.state(), AttachmentState::Mounted);
        assert_eq!(bd.mount_points().len(), 2);
        assert_eq!(ops.mounted.borrow().len(), 2);

        bd.umount();
        assert_eq!(bd.state(), AttachmentState::Detached);
        assert!(bd.mount_points().is_empty());
        assert!(bd.partitions().is_empty());
        assert!(ops.mounted.borrow().is_empty());
        assert!(ops.attached.borrow().is_empty());
    }

    #[test]
    fn test_mount_failure_attempts_every_partition() {
        let ops = FakeOps::default()
            .with_image("/images/disk.raw", 3, 4096)
            .failing_mount("/dev/loop0p1", "wrong fs type");
        let mut bd = BlockDevice::new(&ops);

        bd.setup(Path::new("/images/disk.raw"), 1).unwrap();
        let err = bd.mount().unwrap_err();

        match err {
            Error::Mount { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].partition, PathBuf::from("/dev/loop0p1"));
                assert!(failures[0].message.contains("wrong fs type"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // The other two stay mounted until umount.
        assert_eq!(bd.state(), AttachmentState::Mounted);
        assert_eq!(bd.mount_points().len(), 2);

        bd.umount();
        assert!(ops.mounted.borrow().is_empty());
    }

    #[test]
    fn test_mount_failure_everywhere_leaves_no_mount_points() {
        let ops = FakeOps::default()
            .with_image("/images/disk.raw", 2, 4096)
            .failing_mount("/dev/loop0p1", "bad superblock")
            .failing_mount("/dev/loop0p2", "bad superblock");
        let mut bd = BlockDevice::new(&ops);

        bd.setup(Path::new("/images/disk.raw"), 1).unwrap();
        assert!(bd.mount().is_err());
        assert_eq!(bd.state(), AttachmentState::Attached);
        assert!(bd.mount_points().is_empty());
    }

    #[test]
    fn test_mount_before_setup_fails() {
        let ops = FakeOps::default();
        let mut bd = BlockDevice::new(&ops);
        assert!(matches!(bd.mount(), Err(Error::Mount { .. })));
    }

    #[test]
    fn test_umount_is_idempotent() {
        let ops = FakeOps::default().with_image("/images/disk.raw", 1, 4096);
        let mut bd = BlockDevice::new(&ops);

        bd.setup(Path::new("/images/disk.raw"), 1).unwrap();
        bd.mount().unwrap();
        bd.umount();
        bd.umount();

        assert_eq!(ops.detach_calls.get(), 1);
        assert_eq!(ops.unmount_calls.get(), 1);
        assert!(ops.attached.borrow().is_empty());
    }

    #[test]
    fn test_umount_without_setup() {
        let ops = FakeOps::default();
        let mut bd = BlockDevice::new(&ops);

        bd.umount();
        bd.umount();

        assert_eq!(ops.detach_calls.get(), 0);
        assert_eq!(bd.state(), AttachmentState::Detached);
    }

    #[test]
    fn test_umount_after_failed_attach() {
        let ops = FakeOps::default().failing_attach("/images/broken.raw");
        let mut bd = BlockDevice::new(&ops);

        assert!(bd.setup(Path::new("/images/broken.raw"), 1).is_err());
        assert_eq!(bd.state(), AttachmentState::Detached);

        bd.umount();
        assert_eq!(ops.detach_calls.get(), 0);
    }

    #[test]
    fn test_umount_swallows_unmount_failures() {
        let ops = FakeOps::default().with_image("/images/disk.raw", 2, 4096);
        ops.fail_unmount.set(true);
        let mut bd = BlockDevice::new(&ops);

        bd.setup(Path::new("/images/disk.raw"), 1).unwrap();
        bd.mount().unwrap();
        bd.umount();

        assert_eq!(ops.unmount_calls.get(), 2);
        assert_eq!(ops.detach_calls.get(), 1);
        assert_eq!(bd.state(), AttachmentState::Detached);
        assert!(bd.mount_points().is_empty());
    }

    #[test]
    fn test_drop_releases_resources() {
        let ops = FakeOps::default().with_image("/images/disk.raw", 2, 4096);
        {
            let mut bd = BlockDevice::new(&ops);
            bd.setup(Path::new("/images/disk.raw"), 1).unwrap();
            bd.mount().unwrap();
        }

        assert!(ops.mounted.borrow().is_empty());
        assert!(ops.attached.borrow().is_empty());
    }
}
