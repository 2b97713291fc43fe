//! Ambient project documentation fed into every prompt.

use std::path::Path;

use anyhow::Result;
use tracing::{debug, warn};

use crate::infra::io::read_text;
use crate::infra::walk::FileWalker;

/// Concatenate every file under `root` matching `pattern` as
/// `# <relative path>\n<text>\n\n`. Unreadable files are skipped with a
/// warning; an empty result means no documentation was found.
pub fn collect_project_context(
    root: &Path,
    pattern: &str,
    walker: &FileWalker,
) -> Result<String> {
    let mut out = String::new();

    for rel in walker.matching(root, pattern)? {
        match read_text(root.join(&rel)) {
            Ok(text) => {
                debug!(file = %rel.display(), bytes = text.len(), "context file");
                out.push_str(&format!("# {}\n{}\n\n", rel.display(), text.trim_end()));
            }
            Err(err) => warn!("skipping context file: {err:#}"),
        }
    }

    Ok(out)
}
