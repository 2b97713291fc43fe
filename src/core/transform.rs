//! LLM-backed rewriting of file content.
//!
//! Each operation returns `None` when there is nothing to apply: the model
//! failed, answered with nothing, or answered with the content it was given.
//! Callers treat `None` as a no-op, never as an error.

use crate::core::client::LanguageModel;
use crate::core::prompts::{PromptBrief, lint_fix_prompt, rewrite_prompt, test_fix_prompt};
use crate::infra::logging::LogSink;

pub struct FileTransformer<'a> {
    model: &'a dyn LanguageModel,
    sink: &'a dyn LogSink,
}

impl<'a> FileTransformer<'a> {
    pub fn new(
        model: &'a dyn LanguageModel,
        sink: &'a dyn LogSink,
    ) -> Self {
        Self { model, sink }
    }

    /// Rewrite `content` per the brief's find/replace descriptions.
    pub fn rewrite(
        &self,
        content: &str,
        file_label: &str,
        brief: &PromptBrief<'_>,
    ) -> Option<String> {
        let prompt = rewrite_prompt(content, file_label, brief);
        self.ask(&prompt, content, file_label)
    }

    /// Repair `attempted` after the lint command failed with `lint_output`.
    /// `original` is the file before the rewrite.
    pub fn fix_after_lint_failure(
        &self,
        original: &str,
        attempted: &str,
        file_label: &str,
        lint_output: &str,
        brief: &PromptBrief<'_>,
    ) -> Option<String> {
        let prompt = lint_fix_prompt(original, attempted, file_label, lint_output, brief);
        self.ask(&prompt, attempted, file_label)
    }

    pub fn fix_after_test_failure(
        &self,
        original: &str,
        attempted: &str,
        file_label: &str,
        test_output: &str,
        brief: &PromptBrief<'_>,
    ) -> Option<String> {
        let prompt = test_fix_prompt(original, attempted, file_label, test_output, brief);
        self.ask(&prompt, attempted, file_label)
    }

    fn ask(
        &self,
        prompt: &str,
        input: &str,
        file_label: &str,
    ) -> Option<String> {
        tracing::debug!(file = file_label, %prompt, "transform prompt");

        let answer = match self.model.complete(prompt) {
            Ok(answer) => answer,
            Err(err) => {
                self.sink
                    .log(&format!("LLM processing failed for {file_label}: {err}"));
                return None;
            }
        };

        if answer.trim().is_empty() {
            return None;
        }
        let candidate = normalize_output(&answer, input);
        (candidate != input).then_some(candidate)
    }
}

/// Unwrap a single enclosing code fence and give the answer the same
/// trailing-newline shape as `input`.
///
/// The model is asked for bare code but sometimes fences it anyway, and the
/// client drops the final newline of the answer.
pub fn normalize_output(
    answer: &str,
    input: &str,
) -> String {
    let trimmed = answer
        .trim_start_matches(['\n', '\r'])
        .trim_end();
    let mut body = strip_fence(trimmed).to_string();

    if input.ends_with('\n') && !body.ends_with('\n') {
        body.push('\n');
    }
    body
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return text;
    };
    // Language tag line after the opening fence
    let Some((_, body)) = inner.split_once('\n') else {
        return text;
    };
    if body.contains("\n```") {
        // More than one block; leave it alone
        return text;
    }
    body.strip_suffix('\n').unwrap_or(body)
}
