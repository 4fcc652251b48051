//! Unified error types for the mount-debug-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error`) appears in different contexts.

use snafu::{ResultExt, Snafu};
use std::path::PathBuf;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A single partition that could not be mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFailure {
    /// Partition device node (e.g., "/dev/loop3p1").
    pub partition: PathBuf,
    /// What went wrong, usually the stderr of `mount`.
    pub message: String,
}

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Failed to execute a system command.
    #[snafu(display("failed to execute command '{command}'"))]
    CommandExecution {
        command: String,
        source: std::io::Error,
    },

    /// Command executed but returned non-zero exit code.
    #[snafu(display("command '{command}' exited with code {code}: {stderr}"))]
    CommandExit {
        command: String,
        code: i32,
        stderr: String,
    },

    /// Failed to parse lsblk JSON output.
    #[snafu(display("failed to parse lsblk output: {message}"))]
    LsblkParse { message: String },

    /// The image could not be mapped to a block device, or has no usable layout.
    #[snafu(display("failed to attach {}: {message}", image.display()))]
    Attachment { image: PathBuf, message: String },

    /// Mount point creation failed.
    #[snafu(display("failed to create mount point under {}", path.display()))]
    MountPointCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// One or more partitions failed to mount.
    #[snafu(display("failed to mount {}", describe_failures(failures)))]
    Mount { failures: Vec<PartitionFailure> },

    /// Unmount operation failed.
    #[snafu(display("failed to unmount {}: {message}", path.display()))]
    Unmount { path: PathBuf, message: String },

    /// Failed to list the top level of a mount point.
    #[snafu(display("failed to list {}: {}", path.display(), source))]
    ListDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Output directory could not be created.
    #[snafu(display("failed to create output directory {}", path.display()))]
    OutputDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write an output file.
    #[snafu(display("failed to write output file {}", path.display()))]
    OutputWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config file not found or cannot be read.
    #[snafu(display("failed to read config at {}", path.display()))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config file is not valid JSON for [`crate::config::TaskConfig`].
    #[snafu(display("failed to parse config at {}", path.display()))]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

fn describe_failures(failures: &[PartitionFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.partition.display(), f.message.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for command execution errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;

    /// Add context for mount point creation errors.
    fn mount_point_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for directory listing errors.
    fn list_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for output file write errors.
    fn output_write_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(CommandExecutionSnafu {
            command: command.into(),
        })
    }

    fn mount_point_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(MountPointCreationSnafu { path: path.into() })
    }

    fn list_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(ListDirectorySnafu { path: path.into() })
    }

    fn output_write_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(OutputWriteSnafu { path: path.into() })
    }
}
