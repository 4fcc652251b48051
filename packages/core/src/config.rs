//! Task configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! is a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::{ConfigParseSnafu, ConfigReadSnafu, Result};
use crate::executor::{ExecutionContext, PrivilegeEscalation};

/// Partitions below this many bytes are skipped.
pub const DEFAULT_MIN_PARTITION_SIZE: u64 = 1;

/// Shell used for diagnostic command lines.
pub const DEFAULT_SHELL: &str = "/bin/bash";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Minimum partition size in bytes.
    pub min_partition_size: u64,
    /// Directory mount points are created in. Defaults to the system temp dir.
    pub mount_root: Option<PathBuf>,
    /// How privileged commands are run.
    pub privilege: PrivilegeEscalation,
    /// Shell used to run diagnostic commands.
    pub shell: PathBuf,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            min_partition_size: DEFAULT_MIN_PARTITION_SIZE,
            mount_root: None,
            privilege: PrivilegeEscalation::default(),
            shell: PathBuf::from(DEFAULT_SHELL),
        }
    }
}

impl TaskConfig {
    /// Loads a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context(ConfigReadSnafu { path })?;
        serde_json::from_str(&content).context(ConfigParseSnafu { path })
    }

    /// Effective mount root.
    pub fn mount_root(&self) -> PathBuf {
        self.mount_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn execution_context(&self) -> ExecutionContext {
        ExecutionContext::with_escalation(self.privilege)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: TaskConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TaskConfig::default());
        assert_eq!(config.min_partition_size, 1);
        assert_eq!(config.mount_root(), std::env::temp_dir());
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"min_partition_size": 1048576, "mount_root": "/mnt/debug", "privilege": "sudo"}"#,
        )
        .unwrap();

        let config = TaskConfig::load(&path).unwrap();
        assert_eq!(config.min_partition_size, 1048576);
        assert_eq!(config.mount_root(), PathBuf::from("/mnt/debug"));
        assert_eq!(config.privilege, PrivilegeEscalation::Sudo);
        assert_eq!(config.shell, PathBuf::from(DEFAULT_SHELL));
        assert_eq!(
            config.execution_context().escalation(),
            PrivilegeEscalation::Sudo
        );
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TaskConfig::load(&dir.path().join("missing.json")).is_err());

        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            TaskConfig::load(&path),
            Err(crate::error::Error::ConfigParse { .. })
        ));
    }
}
