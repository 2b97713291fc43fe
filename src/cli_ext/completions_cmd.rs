//! `gfactor completions <shell>`: completion scripts generated from the clap
//! definition, so they track the subcommands and flags automatically.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Command, CommandFactory};
use clap_complete::{Shell as Target, generate, generate_to};

use crate::cli::{AppContext, Cli, CompletionsArgs, Shell};

fn target(shell: &Shell) -> Target {
    match shell {
        Shell::Bash => Target::Bash,
        Shell::Zsh => Target::Zsh,
        Shell::Fish => Target::Fish,
        Shell::PowerShell => Target::PowerShell,
        Shell::Elvish => Target::Elvish,
    }
}

/// The CLI definition and the binary name it declares.
fn command() -> (Command, String) {
    let cmd = Cli::command();
    let name = cmd.get_name().to_string();
    (cmd, name)
}

/// Write the completion script for `shell` to `out`.
pub fn render(
    shell: &Shell,
    out: &mut dyn Write,
) {
    let (mut cmd, name) = command();
    generate(target(shell), &mut cmd, name, out);
}

/// Write the completion script into `dir` (created if missing) and return
/// the file path.
pub fn write_to_dir(
    shell: &Shell,
    dir: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let (mut cmd, name) = command();
    generate_to(target(shell), &mut cmd, name, dir)
        .with_context(|| format!("Failed to write {shell:?} completions to {}", dir.display()))
}

pub fn run(
    args: CompletionsArgs,
    ctx: &AppContext,
) -> Result<()> {
    if args.stdout {
        render(&args.shell, &mut std::io::stdout().lock());
        return Ok(());
    }

    let Some(dir) = args.out_dir else {
        bail!("--out-dir is required unless --stdout is set");
    };
    let path = write_to_dir(&args.shell, &dir)?;
    if !ctx.quiet {
        eprintln!("Wrote completion to {}", path.display());
    }
    Ok(())
}
