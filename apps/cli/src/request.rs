//! Input file list parsing.

use std::fs;
use std::path::Path;

use mount_debug_core::InputFile;

/// Parses a `PATH[=NAME]` argument.
///
/// Without a name, the file name of `PATH` is used.
pub fn parse_input(arg: &str) -> InputFile {
    match arg.rsplit_once('=') {
        Some((path, name)) if !path.is_empty() && !name.is_empty() => InputFile::new(path, name),
        _ => InputFile::from_path(arg),
    }
}

/// Collects inputs from `--input-json` (first) and `--input` arguments.
pub fn collect_inputs(
    args: &[String],
    json_file: Option<&Path>,
) -> Result<Vec<InputFile>, Box<dyn std::error::Error>> {
    let mut inputs = Vec::new();

    if let Some(path) = json_file {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        let files: Vec<InputFile> = serde_json::from_str(&content)
            .map_err(|e| format!("failed to parse {}: {}", path.display(), e))?;
        inputs.extend(files);
    }

    inputs.extend(args.iter().map(|arg| parse_input(arg)));
    Ok(inputs)
}
