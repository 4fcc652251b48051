//! Output file naming and writing.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{IoResultExt, Result};
use crate::protocol::OutputFile;

/// Longest file name stem kept, leaving room for a `-N` suffix and the
/// extension within the usual 255 byte name limit.
const MAX_STEM_BYTES: usize = 200;

/// Sanitize a display name for use as a file name.
///
/// Replaces problematic characters with underscores and truncates the result
/// to [`MAX_STEM_BYTES`] on a char boundary.
fn sanitize_file_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.len() > MAX_STEM_BYTES {
        let mut end = MAX_STEM_BYTES;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized.truncate(end);
    }

    if sanitized.trim_start_matches('.').is_empty() {
        return "output".to_string();
    }
    sanitized
}

/// Reserves the output file for `display_name` in `output_dir`.
///
/// The file is named after the display name. If that name is taken, `-1`,
/// `-2`, ... is appended until a free name is found. The file is created
/// empty with `create_new`, so concurrent runs never share a name.
pub fn create_output_file(
    output_dir: &Path,
    display_name: &str,
    extension: &str,
) -> Result<OutputFile> {
    let stem = sanitize_file_name(display_name);
    let mut path = output_dir.join(format!("{}{}", stem, extension));
    let mut n = 1;
    loop {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                path = output_dir.join(format!("{}-{}{}", stem, n, extension));
                n += 1;
            }
            Err(e) => return Err(e).output_write_context(&path),
        }
    }

    Ok(OutputFile {
        path,
        display_name: display_name.to_string(),
        extension: extension.to_string(),
    })
}

impl OutputFile {
    /// Writes `contents` to the reserved file, replacing anything there.
    pub fn write(&self, contents: &str) -> Result<()> {
        fs::write(&self.path, contents).output_write_context(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("debug-disk.raw"), "debug-disk.raw");
        assert_eq!(sanitize_file_name("debug-my disk/1"), "debug-my_disk_1");
        assert_eq!(sanitize_file_name(".."), "output");
    }

    #[test]
    fn test_long_display_name_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let name = format!("debug-{}", "x".repeat(300));

        let file = create_output_file(dir.path(), &name, ".txt").unwrap();
        file.write("report").unwrap();

        let file_name = file.path.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(file_name.len(), MAX_STEM_BYTES + ".txt".len());
        assert_eq!(file.display_name, name);

        let second = create_output_file(dir.path(), &name, ".txt").unwrap();
        second.write("report").unwrap();
        assert!(second.path.to_string_lossy().ends_with("x-1.txt"));
    }

    #[test]
    fn test_truncation_keeps_char_boundary() {
        let name = "é".repeat(150);
        let sanitized = sanitize_file_name(&name);
        assert_eq!(sanitized.len(), MAX_STEM_BYTES);
        assert!(sanitized.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_create_output_file() {
        let dir = tempfile::tempdir().unwrap();

        let first = create_output_file(dir.path(), "debug-disk.raw", ".txt").unwrap();
        assert_eq!(first.path, dir.path().join("debug-disk.raw.txt"));
        assert!(first.path.is_file());
        assert_eq!(first.display_name, "debug-disk.raw");
        assert_eq!(first.extension, ".txt");
        first.write("report").unwrap();

        let second = create_output_file(dir.path(), "debug-disk.raw", ".txt").unwrap();
        assert_eq!(second.path, dir.path().join("debug-disk.raw-1.txt"));
        assert_eq!(fs::read_to_string(&first.path).unwrap(), "report");
    }

    #[test]
    fn test_reserved_name_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();

        // Reserved but not yet written.
        let first = create_output_file(dir.path(), "debug-disk.raw", ".txt").unwrap();
        let second = create_output_file(dir.path(), "debug-disk.raw", ".txt").unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(fs::read_to_string(&first.path).unwrap(), "");
    }

    #[test]
    fn test_write_to_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = create_output_file(&dir.path().join("missing"), "debug-x", ".txt");
        assert!(matches!(
            result,
            Err(crate::error::Error::OutputWrite { .. })
        ));
    }
}
