//! Command execution with optional privilege escalation.
//!
//! Two flavours live here. [`ExecutionContext`] runs the commands the block
//! device handle depends on (`losetup`, `mount`, ...) and checks their exit
//! status. [`CommandRunner`] runs diagnostic command lines through a shell
//! and only ever captures their output.

use std::path::PathBuf;
use std::process::{Command, Output};

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};

/// Privilege escalation method for executing commands that require root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeEscalation {
    /// Execute directly without privilege escalation.
    #[default]
    None,
    /// Use `sudo` for privileged commands.
    Sudo,
}

impl PrivilegeEscalation {
    /// Picks `Sudo` unless the current process already runs as root.
    pub fn detect() -> Self {
        if nix::unistd::Uid::effective().is_root() {
            Self::None
        } else {
            Self::Sudo
        }
    }
}

/// Execution context for running system commands.
///
/// # Example
///
/// ```
/// use mount_debug_core::executor::{ExecutionContext, PrivilegeEscalation};
///
/// let ctx = ExecutionContext::with_sudo();
/// assert_eq!(ctx.escalation(), PrivilegeEscalation::Sudo);
/// assert_eq!(ctx.shell_line("fdisk -l /dev/loop0"), "sudo fdisk -l /dev/loop0");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    escalation: PrivilegeEscalation,
}

impl ExecutionContext {
    /// Creates a new execution context with no privilege escalation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an execution context that uses `sudo` for privileged commands.
    pub fn with_sudo() -> Self {
        Self {
            escalation: PrivilegeEscalation::Sudo,
        }
    }

    /// Creates an execution context with a specific escalation method.
    pub fn with_escalation(escalation: PrivilegeEscalation) -> Self {
        Self { escalation }
    }

    /// Returns the current privilege escalation method.
    pub fn escalation(&self) -> PrivilegeEscalation {
        self.escalation
    }

    /// Prefixes a shell command line with the escalation wrapper, if any.
    pub fn shell_line(&self, command_line: &str) -> String {
        match self.escalation {
            PrivilegeEscalation::None => command_line.to_string(),
            PrivilegeEscalation::Sudo => format!("sudo {}", command_line),
        }
    }

    /// Executes a command that requires root privileges.
    pub fn run_privileged(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        let mut command = match self.escalation {
            PrivilegeEscalation::None => Command::new(cmd),
            PrivilegeEscalation::Sudo => {
                let mut sudo = Command::new("sudo");
                sudo.arg(cmd);
                sudo
            }
        };

        command
            .args(args)
            .output()
            .command_context(self.shell_line(cmd))
    }

    /// Executes a command that requires root privileges, checking for success.
    ///
    /// Returns the captured stdout on success.
    pub fn run_privileged_checked(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let output = self.run_privileged(cmd, args)?;

        if !output.status.success() {
            return Err(Error::CommandExit {
                command: format!("{} {}", cmd, args.join(" ")),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Captured text of one command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    /// Stdout followed by stderr, as it lands in a report.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Runs a diagnostic command line and captures what it printed.
///
/// Implementations never fail: the exit status is not part of the outcome.
pub trait CommandRunner {
    fn run(&self, command_line: &str) -> CommandOutcome;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, command_line: &str) -> CommandOutcome {
        (**self).run(command_line)
    }
}

/// Runs command lines through `<shell> -c`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: PathBuf,
}

impl ShellRunner {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("/bin/bash")
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command_line: &str) -> CommandOutcome {
        tracing::debug!(command = command_line, "running diagnostic command");

        match Command::new(&self.shell).arg("-c").arg(command_line).output() {
            Ok(output) => CommandOutcome {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            },
            // The spawn failure becomes report text like any other stderr.
            Err(e) => CommandOutcome {
                stdout: String::new(),
                stderr: format!(
                    "failed to execute '{}' with {}: {}\n",
                    command_line,
                    self.shell.display(),
                    e
                ),
            },
        }
    }
}

/// Quotes a value for inclusion in a POSIX shell command line.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:=@%,".contains(c));
    if safe {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context() {
        let ctx = ExecutionContext::default();
        assert_eq!(ctx.escalation(), PrivilegeEscalation::None);
        assert_eq!(ctx.shell_line("blkid -p /dev/loop0"), "blkid -p /dev/loop0");
    }

    #[test]
    fn test_sudo_context() {
        let ctx = ExecutionContext::with_sudo();
        assert_eq!(ctx.escalation(), PrivilegeEscalation::Sudo);
        assert_eq!(
            ctx.shell_line("blkid -p /dev/loop0"),
            "sudo blkid -p /dev/loop0"
        );
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/dev/loop0p1"), "/dev/loop0p1");
        assert_eq!(shell_quote("my disk.img"), "'my disk.img'");
        assert_eq!(shell_quote("it's.img"), r"'it'\''s.img'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_shell_runner_ignores_exit_status() {
        let runner = ShellRunner::new("/bin/sh");
        let outcome = runner.run("echo out; echo 'device busy' >&2; exit 32");
        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr, "device busy\n");
        assert_eq!(outcome.combined(), "out\ndevice busy\n");
    }

    #[test]
    fn test_shell_runner_missing_shell() {
        let runner = ShellRunner::new("/nonexistent/shell");
        let outcome = runner.run("true");
        assert!(outcome.stdout.is_empty());
        assert!(outcome.stderr.contains("failed to execute 'true'"));
    }
}
