//! mount-debug CLI - runs the mount diagnostic task for one invocation.
//!
//! Builds a task request from the command line, runs it and prints the task
//! result as JSON on stdout. Logs go to stderr.

mod logging;
mod request;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use mount_debug_core::executor::PrivilegeEscalation;
use mount_debug_core::{MountDebugTask, TaskConfig};

/// Disk image mount diagnostics.
#[derive(Parser)]
#[command(name = "mount-debug")]
#[command(about = "Attach disk images, inspect and mount their partitions, write debug reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run diagnostics for one or more disk images.
    Run(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Disk image to inspect, optionally with a display name (PATH[=NAME]).
    #[arg(short, long = "input", value_name = "PATH[=NAME]")]
    inputs: Vec<String>,

    /// JSON file holding a list of input files ({"path", "display_name"}).
    #[arg(long, value_name = "FILE")]
    input_json: Option<PathBuf>,

    /// Directory reports are written to.
    #[arg(short, long)]
    output_path: PathBuf,

    /// Workflow identifier passed through to the result.
    #[arg(short, long, default_value = "")]
    workflow_id: String,

    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip partitions smaller than this many bytes.
    #[arg(long)]
    min_partition_size: Option<u64>,

    /// Directory mount points are created in.
    #[arg(long)]
    mount_root: Option<PathBuf>,

    /// How privileged commands are run. Defaults to sudo unless running as root.
    #[arg(long, value_enum)]
    privilege: Option<Privilege>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Privilege {
    None,
    Sudo,
}

impl From<Privilege> for PrivilegeEscalation {
    fn from(value: Privilege) -> Self {
        match value {
            Privilege::None => PrivilegeEscalation::None,
            Privilege::Sudo => PrivilegeEscalation::Sudo,
        }
    }
}

fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => TaskConfig::load(path)?,
        None => TaskConfig {
            privilege: PrivilegeEscalation::detect(),
            ..TaskConfig::default()
        },
    };
    if let Some(size) = args.min_partition_size {
        config.min_partition_size = size;
    }
    if let Some(root) = args.mount_root {
        config.mount_root = Some(root);
    }
    if let Some(privilege) = args.privilege {
        config.privilege = privilege.into();
    }

    tracing::debug!(?config, "effective configuration");

    let input_files = request::collect_inputs(&args.inputs, args.input_json.as_deref())?;
    if input_files.is_empty() {
        return Err("no input files given (use --input or --input-json)".into());
    }

    let request = mount_debug_core::TaskRequest {
        input_files,
        output_path: args.output_path,
        workflow_id: args.workflow_id,
        ..Default::default()
    };

    let task = MountDebugTask::from_config(config);
    let result = task.run(&request)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logging::init();

    match cli.command {
        Commands::Run(args) => {
            if let Err(e) = run(args) {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
    }
}
