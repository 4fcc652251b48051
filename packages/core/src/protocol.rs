//! Task request and result types exchanged with the dispatcher.
//!
//! These mirror what a pipeline stage receives (a list of input files, an
//! output directory, a workflow id) and what it hands to the next stage.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An input file handed to the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// Path of the disk image.
    pub path: PathBuf,
    /// Human-readable name, used to name the report.
    pub display_name: String,
}

impl InputFile {
    pub fn new(path: impl Into<PathBuf>, display_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            display_name: display_name.into(),
        }
    }

    /// Uses the file name of `path` as the display name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, display_name }
    }
}

/// A file produced by the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: PathBuf,
    pub display_name: String,
    /// Extension including the leading dot (e.g., ".txt").
    pub extension: String,
}

/// One invocation of the task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRequest {
    #[serde(default)]
    pub input_files: Vec<InputFile>,
    pub output_path: PathBuf,
    #[serde(default)]
    pub workflow_id: String,
    /// User configuration from the dispatcher. Not interpreted by this task.
    #[serde(default)]
    pub task_config: Map<String, Value>,
}

/// What the task hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub output_files: Vec<OutputFile>,
    pub workflow_id: String,
    pub command: String,
    pub meta: Map<String, Value>,
}

impl TaskResult {
    pub fn new(output_files: Vec<OutputFile>, workflow_id: impl Into<String>) -> Self {
        Self {
            output_files,
            workflow_id: workflow_id.into(),
            command: String::new(),
            meta: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request: TaskRequest = serde_json::from_str(
            r#"{"output_path": "/out", "input_files": [
                {"path": "/in/disk.raw", "display_name": "disk.raw", "uuid": "ignored"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(request.output_path, PathBuf::from("/out"));
        assert_eq!(request.workflow_id, "");
        assert!(request.task_config.is_empty());
        assert_eq!(
            request.input_files,
            vec![InputFile::new("/in/disk.raw", "disk.raw")]
        );
    }

    #[test]
    fn test_input_from_path() {
        let input = InputFile::from_path("/evidence/laptop.qcow2");
        assert_eq!(input.display_name, "laptop.qcow2");
    }

    #[test]
    fn test_result_serialization() {
        let result = TaskResult::new(
            vec![OutputFile {
                path: PathBuf::from("/out/debug-disk.raw.txt"),
                display_name: "debug-disk.raw".to_string(),
                extension: ".txt".to_string(),
            }],
            "wf-1",
        );

        let json: Value = serde_json::to_value(&result).unwrap();
        assert_eq!(json["workflow_id"], "wf-1");
        assert_eq!(json["command"], "");
        assert_eq!(json["meta"], serde_json::json!({}));
        assert_eq!(json["output_files"][0]["display_name"], "debug-disk.raw");
        assert_eq!(json["output_files"][0]["extension"], ".txt");
    }
}
