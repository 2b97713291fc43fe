//! Shared test utilities for integration tests
//!
//! Provides a scripted language model, a scripted verifier and fixture
//! helpers used across multiple test files.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::sync::Arc;

use assert_fs::prelude::*;
use gfactor::core::{Action, LanguageModel, LlmError, MigrationRequest, StopPolicy, Verification, Verifier};

/// The "pattern" the scripted model recognizes
pub const MARKER: &str = "DEBUG_LOG(";

/// Its replacement
pub const REPLACEMENT: &str = "logger.debug(";

/// What the scripted model does with a rewrite prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteMode
{
    /// Replace every marker
    Replace,
    /// Answer with the content unchanged
    Unchanged,
    /// Answer with nothing
    Empty,
    /// Keep the markers and add one more line containing a marker
    AddOne,
}

/// What the scripted model does with a fix prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixMode
{
    /// Append a `// fixed` line to the attempted content
    Append,
    /// Answer with the attempted content unchanged
    Identical,
}

/// Deterministic stand-in for the LLM tool.
///
/// Prompts are classified by their task line. The content under discussion
/// is the first fenced block; fix prompts carry the attempted rewrite in the
/// second one.
pub struct ScriptedModel
{
    pub rewrite: RewriteMode,
    pub fix: FixMode,
    pub prompts: RefCell<Vec<String>>,
    pub counts: Cell<usize>,
    pub rewrites: Cell<usize>,
    pub fixes: Cell<usize>,
}

impl ScriptedModel
{
    pub fn new(
        rewrite: RewriteMode,
        fix: FixMode,
    ) -> Arc<Self>
    {
        Arc::new(Self {
            rewrite,
            fix,
            prompts: RefCell::new(Vec::new()),
            counts: Cell::new(0),
            rewrites: Cell::new(0),
            fixes: Cell::new(0),
        })
    }

    pub fn replacing() -> Arc<Self>
    {
        Self::new(RewriteMode::Replace, FixMode::Append)
    }
}

/// Body of the `n`-th fenced block (0-based) in `prompt`
pub fn fenced_block(
    prompt: &str,
    n: usize,
) -> String
{
    let mut rest = prompt;
    for _ in 0..n
    {
        let start = rest
            .find("```\n")
            .expect("opening fence");
        let after = &rest[start + 4..];
        let end = after
            .find("\n```")
            .expect("closing fence");
        rest = &after[end + 4..];
    }
    let start = rest
        .find("```\n")
        .expect("opening fence");
    let after = &rest[start + 4..];
    let end = after
        .find("\n```")
        .expect("closing fence");
    after[..end].to_string()
}

impl LanguageModel for ScriptedModel
{
    fn complete(
        &self,
        prompt: &str,
    ) -> Result<String, LlmError>
    {
        self.prompts
            .borrow_mut()
            .push(prompt.to_string());

        if prompt.contains("count how many instances")
        {
            self.counts
                .set(self.counts.get() + 1);
            let content = fenced_block(prompt, 0);
            return Ok(content
                .matches(MARKER)
                .count()
                .to_string());
        }

        if prompt.contains("migrate code from one pattern to another")
        {
            self.rewrites
                .set(self.rewrites.get() + 1);
            let content = fenced_block(prompt, 0);
            return Ok(match self.rewrite
            {
                RewriteMode::Replace => content.replace(MARKER, REPLACEMENT),
                RewriteMode::Unchanged => content,
                RewriteMode::Empty => String::new(),
                RewriteMode::AddOne => format!("{content}{MARKER}\"extra\");"),
            });
        }

        // Fix prompt: original first, attempted second
        self.fixes
            .set(self.fixes.get() + 1);
        let attempted = fenced_block(prompt, 1);
        Ok(match self.fix
        {
            FixMode::Append => format!("{attempted}// fixed {}\n", self.fixes.get()),
            FixMode::Identical => attempted,
        })
    }
}

type Script = Box<dyn Fn(&str, usize) -> Verification>;

/// Verifier driven by a closure of (command, 0-based call index for that
/// command).
pub struct ScriptedVerifier
{
    script: Script,
    pub calls: RefCell<Vec<String>>,
}

impl ScriptedVerifier
{
    pub fn new(script: impl Fn(&str, usize) -> Verification + 'static) -> Arc<Self>
    {
        Arc::new(Self { script: Box::new(script), calls: RefCell::new(Vec::new()) })
    }

    pub fn always_pass() -> Arc<Self>
    {
        Self::new(|_, _| Verification::passed(""))
    }

    /// Number of runs of `command`
    pub fn runs_of(
        &self,
        command: &str,
    ) -> usize
    {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }
}

impl Verifier for ScriptedVerifier
{
    fn run(
        &self,
        command: &str,
        _working_dir: &Path,
    ) -> Verification
    {
        let index = self.runs_of(command);
        self.calls
            .borrow_mut()
            .push(command.to_string());
        (self.script)(command, index)
    }
}

/// Request over `*.js` with lint command `lint` and test command `test`
pub fn request(
    action: Action,
    stop: StopPolicy,
) -> MigrationRequest
{
    MigrationRequest {
        lint_command: "lint".to_string(),
        test_command: "test".to_string(),
        file_glob: "**/*.js".to_string(),
        find: "DEBUG_LOG debug statements".to_string(),
        replace: "use logger.debug".to_string(),
        stop_policy: stop,
        action,
    }
}

/// Source text with `n` marker lines
pub fn source_with(n: usize) -> String
{
    let mut body = String::from("function run() {\n");
    for i in 0..n
    {
        body.push_str(&format!("  {MARKER}\"step {i}\");\n"));
    }
    body.push_str("}\n");
    body
}

/// Workspace with one file per `(path, markers)` entry
pub fn workspace(files: &[(&str, usize)]) -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    for (path, n) in files
    {
        tmp.child(path)
            .write_str(&source_with(*n))
            .expect("write fixture");
    }
    tmp
}

pub fn read(
    root: &Path,
    rel: &str,
) -> String
{
    std::fs::read_to_string(root.join(rel)).expect("read fixture")
}
