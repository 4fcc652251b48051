//! Mount diagnostic task.
//!
//! For every input image the task attaches the image, inspects the device and
//! its partitions with external tools, mounts the partitions, lists their top
//! level and writes everything it saw into a text report. Failures end up in
//! the report; the device is always released before the next image starts.

use std::fs;
use std::path::{Path, PathBuf};

use snafu::ResultExt;

use crate::block_device::{BlockDevice, DeviceOps, SystemDeviceOps};
use crate::config::TaskConfig;
use crate::error::{IoResultExt, OutputDirectorySnafu, Result};
use crate::executor::{CommandOutcome, CommandRunner, ExecutionContext, ShellRunner, shell_quote};
use crate::output::create_output_file;
use crate::protocol::{InputFile, OutputFile, TaskRequest, TaskResult};
use crate::report::DiagnosticReport;

/// Prefix of every report's display name.
pub const OUTPUT_PREFIX: &str = "debug-";

/// Extension of every report file.
pub const OUTPUT_EXTENSION: &str = ".txt";

/// How processing of one image ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageStatus {
    Completed,
    /// An error was recorded in the report.
    Failed { message: String },
}

/// Result of processing one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOutcome {
    pub input: InputFile,
    pub output_file: OutputFile,
    pub status: ImageStatus,
}

/// Runs diagnostics for a list of disk images.
#[derive(Debug)]
pub struct MountDebugTask<O: DeviceOps, R: CommandRunner> {
    ops: O,
    runner: R,
    ctx: ExecutionContext,
    config: TaskConfig,
}

impl MountDebugTask<SystemDeviceOps, ShellRunner> {
    /// Task backed by the real system tools.
    pub fn from_config(config: TaskConfig) -> Self {
        let ctx = config.execution_context();
        let ops = SystemDeviceOps::new(ctx, config.mount_root());
        let runner = ShellRunner::new(config.shell.clone());
        Self::new(ops, runner, config)
    }
}

impl<O: DeviceOps, R: CommandRunner> MountDebugTask<O, R> {
    pub fn new(ops: O, runner: R, config: TaskConfig) -> Self {
        Self {
            ops,
            runner,
            ctx: config.execution_context(),
            config,
        }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Processes every input image in order and returns their reports.
    ///
    /// Per-image failures are recorded in the reports. An image whose report
    /// cannot be written is logged and left out of the result. Only an
    /// unusable output directory is returned as an error.
    pub fn run(&self, request: &TaskRequest) -> Result<TaskResult> {
        let span = tracing::info_span!("mount_debug", workflow_id = %request.workflow_id);
        let _guard = span.enter();

        tracing::info!(inputs = request.input_files.len(), "starting mount debug task");
        if !request.task_config.is_empty() {
            tracing::debug!(config = ?request.task_config, "ignoring task config");
        }

        fs::create_dir_all(&request.output_path).context(OutputDirectorySnafu {
            path: &request.output_path,
        })?;

        let mut output_files = Vec::with_capacity(request.input_files.len());
        for input in &request.input_files {
            let outcome = match self.process_image(input, &request.output_path) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(image = %input.display_name, error = %e, "no report written");
                    continue;
                }
            };
            if let ImageStatus::Failed { message } = &outcome.status {
                tracing::warn!(image = %input.display_name, "Error: {}", message);
            }
            output_files.push(outcome.output_file);
        }

        tracing::info!(outputs = output_files.len(), "finished mount debug task");
        Ok(TaskResult::new(output_files, request.workflow_id.clone()))
    }

    /// Processes a single image and writes its report into `output_dir`.
    ///
    /// Fails only when the report file cannot be created or written. The
    /// device is released either way.
    pub fn process_image(&self, input: &InputFile, output_dir: &Path) -> Result<ImageOutcome> {
        self.process(input, output_dir).map(|(outcome, _)| outcome)
    }

    fn process(
        &self,
        input: &InputFile,
        output_dir: &Path,
    ) -> Result<(ImageOutcome, DiagnosticReport)> {
        let span = tracing::info_span!("image", name = %input.display_name);
        let _guard = span.enter();

        let output_file = create_output_file(
            output_dir,
            &format!("{}{}", OUTPUT_PREFIX, input.display_name),
            OUTPUT_EXTENSION,
        )?;

        let mut report = DiagnosticReport::new();
        report.header(&input.display_name, &input.path);

        let mut bd = BlockDevice::new(&self.ops);
        let status = match self.diagnose(input, &mut bd, &mut report) {
            Ok(()) => ImageStatus::Completed,
            Err(e) => {
                let message = e.to_string();
                report.error(&message);
                ImageStatus::Failed { message }
            }
        };

        report.unmount_status(bd.mount_points());
        let text = report.render();
        tracing::debug!(report = %text, "diagnostic report");

        let written = output_file.write(&text);
        bd.umount();
        written?;

        let outcome = ImageOutcome {
            input: input.clone(),
            output_file,
            status,
        };
        Ok((outcome, report))
    }

    fn diagnose(
        &self,
        input: &InputFile,
        bd: &mut BlockDevice<&O>,
        report: &mut DiagnosticReport,
    ) -> Result<()> {
        let image = shell_quote(&input.path.to_string_lossy());
        report.image_info(&self.run_tool(&format!("qemu-img info {}", image)));

        bd.setup(&input.path, self.config.min_partition_size)?;

        let device = bd.device().map(Path::to_path_buf).unwrap_or_default();
        report.device_node(&device);
        if let Some(info) = bd.info() {
            report.device_metadata(info);
        }
        report.partitions(bd.partitions());

        let device_arg = shell_quote(&device.to_string_lossy());
        report.partition_table(&self.run_tool(&format!("fdisk -l {}", device_arg)));
        report.device_signature(&self.run_tool(&format!("blkid -p {}", device_arg)));
        for partition in bd.partitions() {
            let partition_arg = shell_quote(&partition.to_string_lossy());
            let outcome = self.run_tool(&format!("blkid -p {}", partition_arg));
            report.partition_signature(partition, &outcome);
        }

        if let Err(e) = bd.mount() {
            report.mount_failed(&e, bd.mount_points());
            return Err(e);
        }
        report.mount_succeeded(bd.mount_points());

        for mount_point in bd.mount_points() {
            let listing = list_top_level(mount_point);
            report.file_listing(mount_point, &listing.entries, &listing.errors);
        }

        Ok(())
    }

    fn run_tool(&self, command_line: &str) -> CommandOutcome {
        self.runner.run(&self.ctx.shell_line(command_line))
    }
}

#[derive(Debug, Default)]
struct Listing {
    entries: Vec<PathBuf>,
    errors: Vec<String>,
}

/// Immediate children of `dir` that are not hidden, sorted.
///
/// Unreadable entries are collected as messages; the rest are still listed.
fn list_top_level(dir: &Path) -> Listing {
    let mut listing = Listing::default();
    let read_dir = match fs::read_dir(dir).list_context(dir) {
        Ok(read_dir) => read_dir,
        Err(e) => {
            tracing::warn!(error = %e, "cannot list mount point");
            listing.errors.push(e.to_string());
            return listing;
        }
    };

    for entry in read_dir {
        match entry.list_context(dir) {
            Ok(entry) if entry.file_name().to_string_lossy().starts_with('.') => {}
            Ok(entry) => listing.entries.push(entry.path()),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                listing.errors.push(e.to_string());
            }
        }
    }
    listing.entries.sort();
    listing
}
