//! LLM-backed occurrence counting.

use crate::core::client::LanguageModel;
use crate::core::prompts::count_prompt;
use crate::infra::logging::LogSink;

/// Counts pattern occurrences by asking the model.
///
/// Fails open: a model error or an answer without a number counts as zero,
/// so a counting hiccup skips a file instead of aborting the run. Never
/// touches the file system.
pub struct PatternCounter<'a> {
    model: &'a dyn LanguageModel,
    sink: &'a dyn LogSink,
}

impl<'a> PatternCounter<'a> {
    pub fn new(
        model: &'a dyn LanguageModel,
        sink: &'a dyn LogSink,
    ) -> Self {
        Self { model, sink }
    }

    pub fn count(
        &self,
        content: &str,
        find: &str,
        file_label: &str,
        context: &str,
    ) -> u64 {
        let prompt = count_prompt(content, find, file_label, context);
        tracing::debug!(file = file_label, %prompt, "count prompt");

        let answer = match self.model.complete(&prompt) {
            Ok(answer) => answer,
            Err(err) => {
                self.sink.log(&format!(
                    "Counting failed for {file_label}: {err}. Assuming 0 occurrences"
                ));
                return 0;
            }
        };

        match parse_count(&answer) {
            Some(n) => n,
            None => {
                self.sink.log(&format!(
                    "Could not read a count for {file_label}, defaulting to 0"
                ));
                tracing::debug!(file = file_label, %answer, "unparseable count answer");
                0
            }
        }
    }
}

/// First run of ASCII digits in `answer`. A negative number is not a count,
/// so a leading `-` makes the answer unreadable; overflow is `None` too.
pub fn parse_count(answer: &str) -> Option<u64> {
    let start = answer.find(|c: char| c.is_ascii_digit())?;
    if answer[..start].ends_with('-') {
        return None;
    }
    let digits = &answer[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse().ok()
}
