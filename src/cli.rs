use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::request::StopPolicy;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub verbose: bool,  // global --verbose
    pub no_color: bool, // global --no-color
}

#[derive(Parser)]
#[command(name = "gfactor")]
#[command(
    about = "LLM-driven code migration: count, rewrite, lint, test, and revert on failure"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Only print warnings and the final summary
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Include debug diagnostics in the log
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Count pattern occurrences across the matching files
    Count(MigrateArgs),

    /// Migrate the first file that contains the pattern
    MigrateOne(MigrateArgs),

    /// Migrate every matching file
    MigrateAll(MigrateArgs),

    /// Initialize a gfactor.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Glob selecting the files to migrate (e.g. "src/**/*.ts")
    #[arg(long, value_name = "GLOB")]
    pub files: String,

    /// Natural-language description of the code to find
    #[arg(long, value_name = "TEXT")]
    pub find: String,

    /// Natural-language description of the replacement
    #[arg(long, value_name = "TEXT")]
    pub replace: Option<String>,

    /// Lint/compile command; defaults to [commands].lint in the config
    #[arg(long, value_name = "CMD")]
    pub lint: Option<String>,

    /// Test command; defaults to [commands].test in the config
    #[arg(long, value_name = "CMD")]
    pub test: Option<String>,

    /// When to stop; defaults depend on the subcommand
    #[arg(long, value_enum)]
    pub stop: Option<StopPolicy>,

    /// Workspace root (`~` and `$VAR` are expanded)
    #[arg(long, default_value = ".")]
    pub workspace: String,

    /// Write the burndown history as JSON to this path
    #[arg(long, value_name = "PATH")]
    pub history: Option<PathBuf>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
