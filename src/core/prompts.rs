//! Prompt templates sent to the language model.
//!
//! Each template embeds the ambient project context, the file label, the
//! content snapshot(s) in fenced blocks, and the find/replace descriptions.
//! The first fenced block always holds the content the model is asked about;
//! fix prompts add the attempted rewrite and the failure output after it.

use std::fmt::Write as _;

use crate::core::verify::Stage;

/// Shown in place of the context section when no documentation was found.
pub const NO_CONTEXT: &str = "No project context files found.";

/// The free-text parts of a request that every prompt repeats.
#[derive(Debug, Clone, Copy)]
pub struct PromptBrief<'a> {
    pub find: &'a str,
    pub replace: &'a str,
    pub context: &'a str,
}

fn push_header(
    out: &mut String,
    task: &str,
    context: &str,
) {
    let context = if context.trim().is_empty() { NO_CONTEXT } else { context };
    let _ = write!(out, "You are an expert {task}\n\n# Project context:\n{context}\n\n");
}

fn push_block(
    out: &mut String,
    title: &str,
    body: &str,
) {
    let _ = write!(out, "# {title}:\n```\n{body}\n```\n\n");
}

/// Ask for the number of occurrences of `find` in `content`.
pub fn count_prompt(
    content: &str,
    find: &str,
    file_label: &str,
    context: &str,
) -> String {
    let mut out = String::with_capacity(content.len() + 512);
    push_header(
        &mut out,
        "code analyzer. Your task is to count how many instances of a specific pattern exist in the code.",
        context,
    );
    let _ = write!(out, "# File to analyze:\n{file_label}\n\n");
    push_block(&mut out, "Current content", content);
    let _ = write!(
        out,
        "# Pattern to find:\n{find}\n\n\
         Count how many instances of the specified pattern exist.\n\
         Return ONLY a single number representing the count, with no additional text or explanation.\n"
    );
    out
}

/// Ask for `content` rewritten per the brief.
pub fn rewrite_prompt(
    content: &str,
    file_label: &str,
    brief: &PromptBrief<'_>,
) -> String {
    let mut out = String::with_capacity(content.len() + 768);
    push_header(
        &mut out,
        "code refactoring assistant. Your task is to migrate code from one pattern to another.",
        brief.context,
    );
    let _ = write!(out, "# File to refactor:\n{file_label}\n\n");
    push_block(&mut out, "Current content", content);
    let _ = write!(
        out,
        "# Pattern to find:\n{}\n\n# How to replace:\n{}\n\n\
         Refactor the code according to the specified pattern. \
         Return ONLY the refactored code without any explanations or markdown formatting.\n",
        brief.find, brief.replace
    );
    out
}

/// Ask for a repair of `attempted` given the failure output of `stage`.
///
/// `original` is the file as it was before the step began.
pub fn fix_prompt(
    stage: Stage,
    original: &str,
    attempted: &str,
    file_label: &str,
    failure_output: &str,
    brief: &PromptBrief<'_>,
) -> String {
    let (task, failing, output_title) = match stage {
        Stage::Lint => (
            "code refactoring assistant. Your task is to fix linter/compiler errors in code that was just refactored.",
            "Refactored content with linter errors",
            "Linter/compiler errors",
        ),
        Stage::Test => (
            "code refactoring assistant. Your task is to fix test failures in code that was just refactored.",
            "Refactored content with test failures",
            "Test failure output",
        ),
    };

    let mut out = String::with_capacity(original.len() + attempted.len() + failure_output.len() + 1024);
    push_header(&mut out, task, brief.context);
    let _ = write!(out, "# File that was refactored:\n{file_label}\n\n");
    push_block(&mut out, "Original content before refactoring", original);
    push_block(&mut out, failing, attempted);
    push_block(&mut out, output_title, failure_output);
    let _ = write!(
        out,
        "# Pattern that was being migrated:\n{}\n\n# How it was replaced:\n{}\n\n\
         Fix the {} while preserving the intent of the refactoring. \
         Return ONLY the fixed code without any explanations or markdown formatting.\n",
        brief.find,
        brief.replace,
        match stage {
            Stage::Lint => "linter/compiler errors",
            Stage::Test => "test failures",
        }
    );
    out
}

pub fn lint_fix_prompt(
    original: &str,
    attempted: &str,
    file_label: &str,
    lint_output: &str,
    brief: &PromptBrief<'_>,
) -> String {
    fix_prompt(Stage::Lint, original, attempted, file_label, lint_output, brief)
}

pub fn test_fix_prompt(
    original: &str,
    attempted: &str,
    file_label: &str,
    test_output: &str,
    brief: &PromptBrief<'_>,
) -> String {
    fix_prompt(Stage::Test, original, attempted, file_label, test_output, brief)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BRIEF: PromptBrief<'static> = PromptBrief {
        find: "console.log debug statements",
        replace: "use the logger",
        context: "",
    };

    #[test]
    fn count_prompt_embeds_content_and_pattern() {
        let p = count_prompt("let x = 1;", "magic numbers", "src/a.ts", "# rules\nno magic");
        assert!(p.contains("count how many instances"));
        assert!(p.contains("```\nlet x = 1;\n```"));
        assert!(p.contains("magic numbers"));
        assert!(p.contains("src/a.ts"));
        assert!(p.contains("no magic"));
        assert!(!p.contains(NO_CONTEXT));
    }

    #[test]
    fn empty_context_is_replaced() {
        let p = rewrite_prompt("body", "a.js", &BRIEF);
        assert!(p.contains(NO_CONTEXT));
        assert!(p.contains("migrate code"));
        assert!(p.contains("use the logger"));
    }

    #[test]
    fn fix_prompts_are_keyed_on_stage() {
        let lint = lint_fix_prompt("old", "new", "a.js", "E001 unused", &BRIEF);
        let test = test_fix_prompt("old", "new", "a.js", "1 failed", &BRIEF);

        assert!(lint.contains("fix linter/compiler errors"));
        assert!(lint.contains("E001 unused"));
        assert!(test.contains("fix test failures"));
        assert!(test.contains("1 failed"));

        // Original first, attempted second
        let original_at = lint.find("```\nold\n```").unwrap();
        let attempted_at = lint.find("```\nnew\n```").unwrap();
        assert!(original_at < attempted_at);
    }
}
