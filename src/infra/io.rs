use anyhow::{Context, Result};
use std::path::Path;

/// Read a whole file as UTF-8 text.
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).with_context(|| format!("Failed to read file {}", path.display()))
}

/// Overwrite a whole file with `content`. Not atomic: the step's revert
/// relies on the original text it holds in memory, not on a backup.
pub fn write_text<P: AsRef<Path>>(
    path: P,
    content: &str,
) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, content).with_context(|| format!("Failed to write file {}", path.display()))
}
