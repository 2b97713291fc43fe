//! Lint and test command execution.
//!
//! Commands are arbitrary shell strings run in the workspace root. No timeout
//! is imposed; the user's own tooling is trusted to terminate.

use std::fmt;
use std::path::Path;
use std::process::{Command, Output};

use serde::Serialize;
use tracing::debug;

/// Which verification a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Lint,
    Test,
}

impl Stage {
    /// Noun used in progress lines ("Linter", "Tests").
    pub fn label(self) -> &'static str {
        match self {
            Stage::Lint => "Linter",
            Stage::Test => "Tests",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(match self {
            Stage::Lint => "lint",
            Stage::Test => "test",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub success: bool,
    /// stderr when non-empty, stdout otherwise
    pub output: String,
}

impl Verification {
    pub fn passed(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }

    fn from_output(out: &Output) -> Self {
        let stderr = String::from_utf8_lossy(&out.stderr);
        let output = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&out.stdout).into_owned()
        } else {
            stderr.into_owned()
        };
        Self {
            success: out.status.success(),
            output,
        }
    }
}

pub trait Verifier {
    /// Run `command` in `working_dir`. Never fails; a command that cannot be
    /// launched is reported as an unsuccessful verification.
    fn run(
        &self,
        command: &str,
        working_dir: &Path,
    ) -> Verification;
}

/// Runs commands through the platform shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellVerifier;

impl ShellVerifier {
    fn command(command: &str) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        }
    }
}

impl Verifier for ShellVerifier {
    fn run(
        &self,
        command: &str,
        working_dir: &Path,
    ) -> Verification {
        debug!(%command, dir = %working_dir.display(), "running verification command");

        match Self::command(command)
            .current_dir(working_dir)
            .output()
        {
            Ok(out) => Verification::from_output(&out),
            Err(err) => Verification::failed(format!("failed to run `{command}`: {err}")),
        }
    }
}
