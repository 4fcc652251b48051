//! Diagnostic report builder.
//!
//! A report is an append-only list of sections. Callers append sections in
//! the order listed by [`SectionKind`]; `render` joins them once, when the
//! report is written out.

use std::path::{Path, PathBuf};

use crate::disk::DeviceInfo;
use crate::error::Error;
use crate::executor::CommandOutcome;

/// Title line at the top of every report.
pub const REPORT_TITLE: &str = "mount-debug output:";

/// Kind of a report section, in the order sections appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SectionKind {
    Header,
    ImageInfo,
    DeviceNode,
    DeviceMetadata,
    Partitions,
    PartitionTable,
    DeviceSignature,
    PartitionSignature,
    Mount,
    FileListing,
    Error,
    UnmountStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    pub body: String,
}

/// Ordered text sections describing one image.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    sections: Vec<Section>,
}

impl DiagnosticReport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: SectionKind, body: String) {
        self.sections.push(Section { kind, body });
    }

    pub fn header(&mut self, display_name: &str, path: &Path) {
        self.push(
            SectionKind::Header,
            format!(
                "{}\n\nProcessing {} in path {}\n\n",
                REPORT_TITLE,
                display_name,
                path.display()
            ),
        );
    }

    pub fn image_info(&mut self, outcome: &CommandOutcome) {
        self.push(
            SectionKind::ImageInfo,
            format!("\nqemu-img info output:\n{}", outcome.combined()),
        );
    }

    pub fn device_node(&mut self, device: &Path) {
        self.push(
            SectionKind::DeviceNode,
            format!("\nblock device: {}\n\n", device.display()),
        );
    }

    pub fn device_metadata(&mut self, info: &DeviceInfo) {
        self.push(
            SectionKind::DeviceMetadata,
            format!("block device info:\n{}\n\n", info.pretty()),
        );
    }

    pub fn partitions(&mut self, partitions: &[PathBuf]) {
        self.push(
            SectionKind::Partitions,
            format!("partitions: {}\n", format_paths(partitions)),
        );
    }

    pub fn partition_table(&mut self, outcome: &CommandOutcome) {
        self.push(
            SectionKind::PartitionTable,
            format!("\nfdisk output:\n{}", outcome.combined()),
        );
    }

    pub fn device_signature(&mut self, outcome: &CommandOutcome) {
        self.push(
            SectionKind::DeviceSignature,
            format!("\nblkid output:\n{}", outcome.combined()),
        );
    }

    pub fn partition_signature(&mut self, partition: &Path, outcome: &CommandOutcome) {
        self.push(
            SectionKind::PartitionSignature,
            format!(
                "\nblkid output for {}:\n{}",
                partition.display(),
                outcome.combined()
            ),
        );
    }

    pub fn mount_succeeded(&mut self, mount_points: &[PathBuf]) {
        self.push(
            SectionKind::Mount,
            format!(
                "\nMount succeeded.\nmount points: {}\n",
                format_paths(mount_points)
            ),
        );
    }

    /// Records a failed `mount()`, one line per partition when known.
    pub fn mount_failed(&mut self, error: &Error, mount_points: &[PathBuf]) {
        let mut body = String::from("\nMount failed.\n");
        match error {
            Error::Mount { failures } => {
                for failure in failures {
                    body.push_str(&format!(
                        "  {}: {}\n",
                        failure.partition.display(),
                        failure.message.trim()
                    ));
                }
            }
            other => body.push_str(&format!("  {}\n", other)),
        }
        body.push_str(&format!(
            "mount points: {}\n",
            format_paths(mount_points)
        ));
        self.push(SectionKind::Mount, body);
    }

    /// Lists a mount point's top level. Entries that could not be read are
    /// reported after the ones that could.
    pub fn file_listing(&mut self, mount_point: &Path, entries: &[PathBuf], errors: &[String]) {
        let mut body = format!(
            "\nListing root folder files in {}\n",
            mount_point.display()
        );
        for entry in entries {
            body.push_str(&format!("{}\n", entry.display()));
        }
        for error in errors {
            body.push_str(&format!("Unreadable: {}\n", error));
        }
        self.push(SectionKind::FileListing, body);
    }

    pub fn error(&mut self, message: &str) {
        self.push(SectionKind::Error, format!("\nError: {}\n", message));
    }

    pub fn unmount_status(&mut self, mount_points: &[PathBuf]) {
        self.push(
            SectionKind::UnmountStatus,
            format!("\nUnmounting: {}\n", format_paths(mount_points)),
        );
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Section kinds in append order.
    pub fn kinds(&self) -> Vec<SectionKind> {
        self.sections.iter().map(|s| s.kind).collect()
    }

    pub fn has_error(&self) -> bool {
        self.sections.iter().any(|s| s.kind == SectionKind::Error)
    }

    pub fn render(&self) -> String {
        self.sections.iter().map(|s| s.body.as_str()).collect()
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    let quoted: Vec<String> = paths
        .iter()
        .map(|p| format!("'{}'", p.display()))
        .collect();
    format!("[{}]", quoted.join(", "))
}
