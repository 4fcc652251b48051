//! mount-debug-core: Core library for disk image mount diagnostics.
//!
//! This library attaches disk images as loop devices, inspects and mounts
//! their partitions, and writes a plain-text diagnostic report per image.
//! The device is always detached afterward, whatever happened in between.
//!
//! # Modules
//!
//! - [`block_device`]: Loop device handle (setup, mount, umount)
//! - [`disk`]: Device metadata using `lsblk`
//! - [`mount`]: Mount point creation and read-only mounts
//! - [`executor`]: Privileged commands and diagnostic command capture
//! - [`report`]: Diagnostic report builder
//! - [`task`]: Per-image orchestration
//! - [`protocol`]: Task request/result types
//! - [`output`]: Output file naming and writing
//! - [`config`]: Task configuration
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use mount_debug_core::{InputFile, MountDebugTask, TaskConfig, TaskRequest};
//!
//! let task = MountDebugTask::from_config(TaskConfig::default());
//! let request = TaskRequest {
//!     input_files: vec![InputFile::from_path("/evidence/disk.raw")],
//!     output_path: "/tmp/reports".into(),
//!     workflow_id: "example".to_string(),
//!     ..TaskRequest::default()
//! };
//!
//! // Requires root (or sudo) and losetup/mount on the host.
//! let result = task.run(&request).unwrap();
//! for file in &result.output_files {
//!     println!("{}", file.path.display());
//! }
//! ```

pub mod block_device;
pub mod config;
pub mod disk;
pub mod error;
pub mod executor;
pub mod mount;
pub mod output;
pub mod protocol;
pub mod report;
pub mod task;

// Re-export commonly used types
pub use block_device::{AttachmentState, BlockDevice, DeviceOps, SystemDeviceOps};
pub use config::TaskConfig;
pub use error::{Error, Result};
pub use executor::{CommandOutcome, CommandRunner, ShellRunner};
pub use protocol::{InputFile, OutputFile, TaskRequest, TaskResult};
pub use report::DiagnosticReport;
pub use task::{ImageOutcome, ImageStatus, MountDebugTask};
