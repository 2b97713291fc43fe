//! Burndown history of remaining pattern occurrences.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point of the burndown series.
///
/// The first snapshot of a run has no `file` and holds the pre-migration
/// total. Later ones hold the running total after a successful fix in `file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSnapshot {
    pub timestamp: DateTime<Utc>,
    pub count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Append-only snapshot sequence with non-decreasing timestamps.
///
/// Counts are not required to decrease; a rewrite that introduces new
/// occurrences raises the running total.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BurndownHistory {
    snapshots: Vec<PatternSnapshot>,
}

impl BurndownHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp, never earlier than the last recorded one.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.snapshots.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        }
    }

    /// Record the pre-migration total.
    pub fn record_initial(
        &mut self,
        total: i64,
    ) -> &PatternSnapshot {
        let timestamp = self.next_timestamp();
        self.push(PatternSnapshot {
            timestamp,
            count: total,
            file: None,
        })
    }

    /// Record a successful fix: the new total is the current one minus
    /// `patterns_fixed`.
    pub fn record_fix(
        &mut self,
        file: impl Into<PathBuf>,
        patterns_fixed: i64,
    ) -> &PatternSnapshot {
        let timestamp = self.next_timestamp();
        let count = self.current_total() - patterns_fixed;
        self.push(PatternSnapshot {
            timestamp,
            count,
            file: Some(file.into()),
        })
    }

    fn push(
        &mut self,
        snapshot: PatternSnapshot,
    ) -> &PatternSnapshot {
        self.snapshots.push(snapshot);
        &self.snapshots[self.snapshots.len() - 1]
    }

    /// Count of the latest snapshot, or 0 when empty.
    pub fn current_total(&self) -> i64 {
        self.snapshots
            .last()
            .map_or(0, |s| s.count)
    }

    pub fn snapshots(&self) -> &[PatternSnapshot] {
        &self.snapshots
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    /// Write the series as a pretty JSON array.
    pub fn write_json(
        &self,
        path: &Path,
    ) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize burndown history")?;
        fs::write(path, json + "\n").with_context(|| format!("Failed to write history: {}", path.display()))
    }
}
