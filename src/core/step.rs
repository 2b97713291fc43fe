//! Migration of a single file: count, rewrite, verify, fix, revert.
//!
//! State flow:
//!
//! ```text
//! Scanning → Transforming → Verifying(Lint) ⇄ Fixing(Lint)
//!                         → Verifying(Test) ⇄ Fixing(Test) → Done
//! ```
//!
//! Any stage that runs out of attempts ends in `Reverted`, with the file
//! restored byte-for-byte to what it held when the step began. A file with
//! no occurrences, or one the model leaves unchanged, ends in `Skipped`
//! without ever being written.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::instrument;

use crate::core::client::LanguageModel;
use crate::core::counter::PatternCounter;
use crate::core::prompts::PromptBrief;
use crate::core::request::MigrationRequest;
use crate::core::retry::RetryPolicy;
use crate::core::transform::FileTransformer;
use crate::core::verify::{Stage, Verifier};
use crate::infra::io::{read_text, write_text};
use crate::infra::logging::{LOG_OUTPUT_LIMIT, LogSink, truncate_for_log};

/// Attempts per verification stage, fix rounds included.
pub const DEFAULT_MAX_FIX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepState {
    Scanning,
    Transforming,
    Verifying(Stage),
    Fixing(Stage),
    Done,
    Reverted,
    Skipped,
    /// Target could not be read or written
    Failed,
}

/// Result of one step. Skips and failures both report `success: false` and
/// zero fixed; `final_state` tells them apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub file: PathBuf,
    pub success: bool,
    /// Occurrences before minus after; negative when the rewrite added some
    pub patterns_fixed: i64,
    pub final_state: StepState,
}

impl FileOutcome {
    pub fn is_skip(&self) -> bool {
        self.final_state == StepState::Skipped
    }
}

/// Why a verification stage gave up.
enum StageError {
    /// Last command output
    Failed(String),
    /// A fix could not be written
    Io(anyhow::Error),
}

pub struct FileMigrationStep<'a> {
    model: &'a dyn LanguageModel,
    verifier: &'a dyn Verifier,
    sink: &'a dyn LogSink,
    workspace: &'a Path,
    request: &'a MigrationRequest,
    context: &'a str,
    max_fix_attempts: u32,
}

impl<'a> FileMigrationStep<'a> {
    pub fn new(
        model: &'a dyn LanguageModel,
        verifier: &'a dyn Verifier,
        sink: &'a dyn LogSink,
        workspace: &'a Path,
        request: &'a MigrationRequest,
        context: &'a str,
    ) -> Self {
        Self {
            model,
            verifier,
            sink,
            workspace,
            request,
            context,
            max_fix_attempts: DEFAULT_MAX_FIX_ATTEMPTS,
        }
    }

    pub fn with_max_fix_attempts(
        mut self,
        attempts: u32,
    ) -> Self {
        self.max_fix_attempts = attempts.max(1);
        self
    }

    fn enter(
        &self,
        state: StepState,
    ) {
        tracing::trace!(?state, "step state");
    }

    fn brief(&self) -> PromptBrief<'_> {
        PromptBrief {
            find: &self.request.find,
            replace: &self.request.replace,
            context: self.context,
        }
    }

    fn finish(
        &self,
        rel: &Path,
        state: StepState,
        patterns_fixed: i64,
    ) -> FileOutcome {
        self.enter(state);
        let success = state == StepState::Done;
        FileOutcome {
            file: rel.to_path_buf(),
            success,
            patterns_fixed: if success { patterns_fixed } else { 0 },
            final_state: state,
        }
    }

    /// Migrate `rel` (relative to the workspace). `known_count` skips the
    /// initial count call when the caller already asked.
    #[instrument(level = "debug", skip(self, rel), fields(file = %rel.display()))]
    pub fn run(
        &self,
        rel: &Path,
        known_count: Option<u64>,
    ) -> FileOutcome {
        self.enter(StepState::Scanning);
        let label = rel.to_string_lossy();
        let path = self.workspace.join(rel);
        self.sink.log(&format!("Processing file: {label}"));

        let original = match read_text(&path) {
            Ok(text) => text,
            Err(err) => {
                self.sink.log(&format!("Could not read {label}: {err:#}"));
                return self.finish(rel, StepState::Failed, 0);
            }
        };

        let counter = PatternCounter::new(self.model, self.sink);
        let before = match known_count {
            Some(n) => n,
            None => {
                let n = counter.count(&original, &self.request.find, &label, self.context);
                self.sink
                    .log(&format!("Found {n} pattern occurrences in {label}"));
                n
            }
        };
        if before == 0 {
            self.sink
                .log(&format!("Skipping file {label} - no patterns found"));
            return self.finish(rel, StepState::Skipped, 0);
        }

        self.enter(StepState::Transforming);
        self.sink
            .log(&format!("Processing {label} with LLM..."));
        let transformer = FileTransformer::new(self.model, self.sink);
        let brief = self.brief();

        let Some(rewritten) = transformer.rewrite(&original, &label, &brief) else {
            self.sink
                .log(&format!("No changes made by LLM for {label}"));
            return self.finish(rel, StepState::Skipped, 0);
        };

        let after = counter.count(&rewritten, &self.request.find, &label, self.context);
        let patterns_fixed = before as i64 - after as i64;
        self.sink
            .log(&format!("LLM fixed {patterns_fixed} pattern occurrences in {label}"));

        self.sink
            .log(&format!("Writing updated content to {label}"));
        if let Err(err) = write_text(&path, &rewritten) {
            self.sink
                .log(&format!("Could not write {label}: {err:#}"));
            self.revert(&path, &label, &original);
            return self.finish(rel, StepState::Failed, 0);
        }

        let mut current = rewritten;
        for (stage, command) in [
            (Stage::Lint, self.request.lint_command.as_str()),
            (Stage::Test, self.request.test_command.as_str()),
        ] {
            if let Err(err) = self.verify_stage(stage, command, &path, &label, &original, &mut current, &brief) {
                match err {
                    StageError::Failed(_) => self.sink.log(&format!(
                        "{} failed after {} attempts. Reverting changes.",
                        stage.label(),
                        self.max_fix_attempts
                    )),
                    StageError::Io(err) => self.sink.log(&format!(
                        "Could not apply {stage} fix to {label}: {err:#}. Reverting changes."
                    )),
                }
                self.revert(&path, &label, &original);
                return self.finish(rel, StepState::Reverted, 0);
            }
        }

        self.sink
            .log(&format!("Tests passed for {label}"));
        self.finish(rel, StepState::Done, patterns_fixed)
    }

    /// Run one verification stage under the fix loop. `current` tracks the
    /// content on disk and is updated whenever a fix is applied.
    #[allow(clippy::too_many_arguments)]
    fn verify_stage(
        &self,
        stage: Stage,
        command: &str,
        path: &Path,
        label: &str,
        original: &str,
        current: &mut String,
        brief: &PromptBrief<'_>,
    ) -> Result<(), StageError> {
        let policy = RetryPolicy::new(self.max_fix_attempts);
        let max = policy.max_attempts;
        let transformer = FileTransformer::new(self.model, self.sink);

        policy.run(
            |attempt| {
                self.enter(StepState::Verifying(stage));
                self.sink.log(&format!(
                    "Running {} (attempt {attempt}/{max}): {command}",
                    stage.label().to_lowercase()
                ));

                let result = self.verifier.run(command, self.workspace);
                if result.success {
                    self.sink.log(&format!(
                        "{} passed on attempt {attempt}",
                        stage.label()
                    ));
                    Ok(())
                } else {
                    if !result.output.trim().is_empty() {
                        self.sink.log(&format!(
                            "{} output: {}",
                            stage.label(),
                            truncate_for_log(result.output.trim_end(), LOG_OUTPUT_LIMIT)
                        ));
                    }
                    Err(StageError::Failed(result.output))
                }
            },
            |err| matches!(err, StageError::Failed(_)),
            |attempt, err| {
                let StageError::Failed(output) = err else {
                    return Ok(());
                };
                self.enter(StepState::Fixing(stage));
                self.sink.log(&format!(
                    "{} failed on attempt {attempt}. Trying to fix...",
                    stage.label()
                ));

                let suggestion = match stage {
                    Stage::Lint => transformer.fix_after_lint_failure(original, current.as_str(), label, output, brief),
                    Stage::Test => transformer.fix_after_test_failure(original, current.as_str(), label, output, brief),
                };
                match suggestion {
                    Some(fixed) => {
                        self.sink.log(&format!(
                            "LLM suggested fixes for {stage} issues. Applying changes..."
                        ));
                        write_text(path, &fixed).map_err(StageError::Io)?;
                        *current = fixed;
                    }
                    None => self.sink.log(&format!(
                        "LLM couldn't suggest fixes for {stage} issues. Trying again with current changes..."
                    )),
                }
                Ok(())
            },
        )
    }

    fn revert(
        &self,
        path: &Path,
        label: &str,
        original: &str,
    ) {
        if let Err(err) = write_text(path, original) {
            self.sink.log(&format!(
                "Failed to restore original content of {label}: {err:#}"
            ));
        }
    }
}
