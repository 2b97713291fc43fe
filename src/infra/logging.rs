//! Narrative progress log and tracing setup.
//!
//! The engine reports human-readable progress through a [`LogSink`] handed to
//! it at construction. There is no global channel: the CLI passes a
//! [`TracingSink`], tests pass a [`MemorySink`] and read the lines back.

use std::sync::Mutex;

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Longest command output echoed into the narrative log.
pub const LOG_OUTPUT_LIMIT: usize = 500;

/// Receiver for progress lines. Implementations must not fail.
pub trait LogSink {
    fn log(
        &self,
        line: &str,
    );
}

/// Forwards progress lines to `tracing` under the `gfactor::progress` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(
        &self,
        line: &str,
    ) {
        tracing::info!(target: "gfactor::progress", "{line}");
    }
}

/// Collects progress lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// True if any logged line contains `needle`.
    pub fn contains(
        &self,
        needle: &str,
    ) -> bool {
        self.lines()
            .iter()
            .any(|l| l.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(
        &self,
        line: &str,
    ) {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push(line.to_string());
    }
}

/// Shorten `text` to at most `limit` bytes on a char boundary, marking the cut.
pub fn truncate_for_log(
    text: &str,
    limit: usize,
) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &text[..end])
}

/// Install the fmt subscriber. `GFACTOR_LOG` overrides the level chosen from
/// the flags (`--quiet` → warn, `--verbose` → debug, otherwise info).
pub fn init_tracing(
    verbose: bool,
    quiet: bool,
    no_color: bool,
) -> Result<()> {
    let default_level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_env("GFACTOR_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_ansi(!no_color)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}
