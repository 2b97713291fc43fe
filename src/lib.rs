//! **gfactor** - LLM-driven code migration from the command line
//!
//! Finds a natural-language pattern across a file set, has an external LLM
//! tool rewrite each file, verifies the result with the project's own lint
//! and test commands, and reverts any file that cannot be made to pass.
//! Progress is recorded as a burndown history of remaining occurrences.

/// Command-line interface with clap integration
pub mod cli;

/// Subcommand handlers
pub mod cli_ext {
    /// `count`, `migrate-one`, `migrate-all`
    pub mod migrate_cmd;

    /// `completions`
    pub mod completions_cmd;
}

/// Migration engine - process client, per-file step, orchestration
pub mod core {
    /// Line-delimited JSON stream of the LLM tool
    mod stream;

    /// Streaming subprocess client with timeout, heartbeat and retries
    pub mod client;
    pub use client::{ClientOptions, LanguageModel, LlmError, StreamingProcessClient};

    /// Bounded retry with backoff, shared by the client and the fix loop
    pub mod retry;
    pub use retry::RetryPolicy;

    /// Prompt templates
    pub mod prompts;

    /// Occurrence counting (fail-open)
    pub mod counter;
    pub use counter::{PatternCounter, parse_count};

    /// Rewrite and fix requests
    pub mod transform;
    pub use transform::FileTransformer;

    /// Lint/test command execution
    pub mod verify;
    pub use verify::{ShellVerifier, Stage, Verification, Verifier};

    /// Cooperative cancellation
    pub mod cancel;
    pub use cancel::CancellationToken;

    /// Burndown history
    pub mod history;
    pub use history::{BurndownHistory, PatternSnapshot};

    /// Run input: actions and stop policies
    pub mod request;
    pub use request::{Action, MigrationRequest, StopPolicy};

    /// Single-file count/rewrite/verify/revert state machine
    pub mod step;
    pub use step::{FileMigrationStep, FileOutcome, StepState};

    /// Run-level driver
    pub mod orchestrator;
    pub use orchestrator::{CountReport, MigrationError, MigrationOrchestrator, RunOutcome, RunReport};
}

/// Infrastructure - Configuration, I/O, logging, and file discovery
pub mod infra {
    /// Layered configuration (file + GFACTOR_* env)
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Whole-file UTF-8 read/write
    pub mod io;

    /// Progress sinks and tracing setup
    pub mod logging;
    pub use logging::{LogSink, MemorySink, TracingSink};

    /// Gitignore-aware glob expansion
    pub mod walk;
    pub use walk::FileWalker;

    /// Project documentation for prompts
    pub mod context;
    pub use context::collect_project_context;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use infra::{Config, FileWalker, load_config};

// Core types for external consumers
pub use core::{
    Action, BurndownHistory, CancellationToken, FileOutcome, LanguageModel, MigrationOrchestrator, MigrationRequest,
    PatternSnapshot, StopPolicy, StreamingProcessClient, Verifier,
};
