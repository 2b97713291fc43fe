//! Run-level driver: enumerate, pre-scan, migrate file by file.
//!
//! Files are processed strictly one at a time. Cancellation is observed
//! between files and between pre-scan counts only; a file that has started
//! always runs its step to the end, so the revert guarantee holds.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::core::cancel::CancellationToken;
use crate::core::client::LanguageModel;
use crate::core::counter::PatternCounter;
use crate::core::history::BurndownHistory;
use crate::core::request::{Action, MigrationRequest, StopPolicy};
use crate::core::step::{DEFAULT_MAX_FIX_ATTEMPTS, FileMigrationStep, FileOutcome};
use crate::core::verify::Verifier;
use crate::infra::io::read_text;
use crate::infra::logging::LogSink;
use crate::infra::walk::FileWalker;

/// Conditions that stop a run before any file is touched.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("workspace directory not found: {}", .0.display())]
    NoWorkspace(PathBuf),

    #[error("credentials missing: environment variable `{0}` is not set")]
    NoCredentials(String),

    #[error("invalid file pattern `{pattern}`")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CountReport {
    pub files_scanned: usize,
    pub files_with_patterns: usize,
    pub total: u64,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Files selected for processing
    pub files_total: usize,
    /// Files whose step went past the skip checks
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Sum over successful files; may be negative
    pub patterns_fixed: i64,
    /// Running total after the run, from the burndown history
    pub remaining: i64,
    pub cancelled: bool,
    /// The stop policy ended the run with files left
    pub stopped_early: bool,
}

impl RunReport {
    fn tally(
        &mut self,
        outcome: &FileOutcome,
    ) {
        if outcome.is_skip() {
            self.skipped += 1;
            return;
        }
        self.processed += 1;
        if outcome.success {
            self.succeeded += 1;
            self.patterns_fixed += outcome.patterns_fixed;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RunOutcome {
    Counted(CountReport),
    Migrated(RunReport),
}

pub struct MigrationOrchestrator {
    model: Arc<dyn LanguageModel>,
    verifier: Arc<dyn Verifier>,
    sink: Arc<dyn LogSink>,
    workspace: PathBuf,
    context: String,
    walker: FileWalker,
    max_fix_attempts: u32,
    /// Environment variable that must be non-empty before a run
    required_credential: Option<String>,
    history: BurndownHistory,
}

impl MigrationOrchestrator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        verifier: Arc<dyn Verifier>,
        sink: Arc<dyn LogSink>,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            model,
            verifier,
            sink,
            workspace: workspace.into(),
            context: String::new(),
            walker: FileWalker::default(),
            max_fix_attempts: DEFAULT_MAX_FIX_ATTEMPTS,
            required_credential: None,
            history: BurndownHistory::new(),
        }
    }

    /// Project documentation included in every prompt.
    pub fn with_context(
        mut self,
        context: impl Into<String>,
    ) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_walker(
        mut self,
        walker: FileWalker,
    ) -> Self {
        self.walker = walker;
        self
    }

    pub fn with_max_fix_attempts(
        mut self,
        attempts: u32,
    ) -> Self {
        self.max_fix_attempts = attempts.max(1);
        self
    }

    pub fn with_required_credential(
        mut self,
        var: Option<String>,
    ) -> Self {
        self.required_credential = var;
        self
    }

    /// Burndown series of the last `migrate` call.
    pub fn history(&self) -> &BurndownHistory {
        &self.history
    }

    /// Fatal preconditions, checked before anything is read.
    pub fn preflight(&self) -> Result<(), MigrationError> {
        if !self.workspace.is_dir() {
            return Err(MigrationError::NoWorkspace(self.workspace.clone()));
        }
        if let Some(var) = &self.required_credential {
            let present = std::env::var(var).is_ok_and(|v| !v.trim().is_empty());
            if !present {
                return Err(MigrationError::NoCredentials(var.clone()));
            }
        }
        Ok(())
    }

    fn enumerate(
        &self,
        request: &MigrationRequest,
    ) -> Result<Vec<PathBuf>, MigrationError> {
        self.sink.log(&format!(
            "Searching for files matching pattern: {}",
            request.file_glob
        ));
        let files = self
            .walker
            .matching(&self.workspace, &request.file_glob)
            .map_err(|err| MigrationError::InvalidGlob {
                pattern: request.file_glob.clone(),
                source: err.into(),
            })?;

        if files.is_empty() {
            self.sink
                .log("WARNING: No files found matching the specified pattern.");
        } else {
            self.sink
                .log(&format!("Found {} files to process", files.len()));
        }
        Ok(files)
    }

    /// Count occurrences in one file. `None` when it could not be read.
    fn count_file(
        &self,
        rel: &Path,
        find: &str,
    ) -> Option<u64> {
        let content = match read_text(self.workspace.join(rel)) {
            Ok(content) => content,
            Err(err) => {
                self.sink
                    .log(&format!("Could not read {}: {err:#}", rel.display()));
                return None;
            }
        };
        let counter = PatternCounter::new(self.model.as_ref(), self.sink.as_ref());
        Some(counter.count(&content, find, &rel.to_string_lossy(), &self.context))
    }

    /// Count occurrences across all matching files without writing anything.
    pub fn count_only(
        &self,
        request: &MigrationRequest,
        cancel: &CancellationToken,
    ) -> Result<CountReport, MigrationError> {
        self.preflight()?;
        let files = self.enumerate(request)?;
        let mut report = CountReport::default();

        for rel in &files {
            if cancel.is_cancelled() {
                self.sink.log("Counting cancelled.");
                report.cancelled = true;
                break;
            }
            let Some(n) = self.count_file(rel, &request.find) else {
                continue;
            };
            report.files_scanned += 1;
            if n > 0 {
                self.sink
                    .log(&format!("Found {n} pattern occurrences in {}", rel.display()));
                report.files_with_patterns += 1;
                report.total += n;
            }
        }

        self.sink.log(&format!(
            "Total pattern occurrences: {} in {} of {} files",
            report.total, report.files_with_patterns, report.files_scanned
        ));
        Ok(report)
    }

    /// Select the files to process with their pre-scan counts, recording the
    /// initial snapshot. `None` means there is nothing to do.
    fn plan(
        &mut self,
        request: &MigrationRequest,
        files: Vec<PathBuf>,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Option<Vec<(PathBuf, Option<u64>)>> {
        if request.action == Action::MigrateOneFile {
            self.sink
                .log("Looking for the first file with patterns to migrate...");
            for rel in files {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    return None;
                }
                let n = self.count_file(&rel, &request.find).unwrap_or(0);
                if n > 0 {
                    self.sink
                        .log(&format!("Found {n} pattern occurrences in {}", rel.display()));
                    self.sink.log(&format!(
                        "MIGRATE ONE FILE MODE: Will only process file: {}",
                        rel.display()
                    ));
                    self.history.record_initial(n as i64);
                    return Some(vec![(rel, Some(n))]);
                }
            }
            self.sink
                .log("WARNING: No files with patterns found to migrate.");
            return None;
        }

        self.sink
            .log("Scanning files for initial pattern count...");
        let mut planned = Vec::with_capacity(files.len());
        let mut total: u64 = 0;
        for rel in files {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return None;
            }
            let count = self.count_file(&rel, &request.find);
            if let Some(n) = count.filter(|n| *n > 0) {
                self.sink
                    .log(&format!("Found {n} pattern occurrences in {}", rel.display()));
                total += n;
            }
            planned.push((rel, count));
        }

        self.history.record_initial(total as i64);
        if total == 0 {
            self.sink
                .log("WARNING: No patterns found in any files.");
            return None;
        }
        self.sink
            .log(&format!("Total initial pattern count: {total}"));
        self.sink
            .log(&format!("Will process {} files", planned.len()));
        Some(planned)
    }

    /// Migrate files per the request's action and stop policy.
    ///
    /// Per-file failures are logged and counted; only the preconditions in
    /// [`MigrationError`] end the run with an error.
    pub fn migrate(
        &mut self,
        request: &MigrationRequest,
        cancel: &CancellationToken,
    ) -> Result<RunReport, MigrationError> {
        self.history.clear();
        self.preflight()?;
        self.sink
            .log("Starting code migration process");

        let mut report = RunReport::default();
        let files = self.enumerate(request)?;
        if files.is_empty() {
            return Ok(report);
        }

        let Some(planned) = self.plan(request, files, cancel, &mut report) else {
            if report.cancelled {
                self.sink
                    .log("Migration cancelled during the initial scan.");
            }
            report.remaining = self.history.current_total();
            return Ok(report);
        };
        report.files_total = planned.len();

        let step = FileMigrationStep::new(
            self.model.as_ref(),
            self.verifier.as_ref(),
            self.sink.as_ref(),
            &self.workspace,
            request,
            &self.context,
        )
        .with_max_fix_attempts(self.max_fix_attempts);

        let n = planned.len();
        for (i, (rel, known)) in planned.iter().enumerate() {
            if cancel.is_cancelled() {
                self.sink
                    .log(&format!("Migration cancelled before {}", rel.display()));
                report.cancelled = true;
                break;
            }

            self.sink
                .log(&format!("Processing file {}/{n}: {}", i + 1, rel.display()));
            let outcome = step.run(rel, *known);
            debug!(?outcome, "file outcome");
            report.tally(&outcome);

            if outcome.success {
                let snapshot = self
                    .history
                    .record_fix(rel.clone(), outcome.patterns_fixed);
                self.sink.log(&format!(
                    "Successfully fixed {} pattern occurrences in {} ({} remaining)",
                    outcome.patterns_fixed,
                    rel.display(),
                    snapshot.count
                ));
            }

            let stop = match request.stop_policy {
                StopPolicy::AfterEachFix => outcome.success,
                StopPolicy::AfterEachFile => !outcome.is_skip(),
                StopPolicy::WhenComplete => false,
            };
            if stop && i + 1 < n {
                self.sink.log(&format!(
                    "Stopping after {} as requested ({}/{n} files)",
                    rel.display(),
                    i + 1
                ));
                report.stopped_early = true;
                break;
            }
        }

        report.remaining = self.history.current_total();
        info!(?report, "migration finished");
        self.sink.log(&format!(
            "Code migration finished: {} succeeded, {} failed, {} skipped, {} patterns fixed",
            report.succeeded, report.failed, report.skipped, report.patterns_fixed
        ));
        Ok(report)
    }

    /// Dispatch on the request's action.
    pub fn run(
        &mut self,
        request: &MigrationRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, MigrationError> {
        match request.action {
            Action::CountOnly => self
                .count_only(request, cancel)
                .map(RunOutcome::Counted),
            Action::MigrateOneFile | Action::MigrateAllFiles => self
                .migrate(request, cancel)
                .map(RunOutcome::Migrated),
        }
    }
}
