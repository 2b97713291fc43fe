//! CLI handlers for `count`, `migrate-one` and `migrate-all`.
//!
//! Wires config, file walking, project context and the subprocess client
//! into a [`MigrationOrchestrator`], runs it, and prints the summary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use tracing::{info, instrument, warn};

use crate::cli::{AppContext, MigrateArgs};
use crate::core::cancel::CancellationToken;
use crate::core::client::StreamingProcessClient;
use crate::core::orchestrator::{CountReport, MigrationOrchestrator, RunOutcome, RunReport};
use crate::core::request::{Action, MigrationRequest};
use crate::core::verify::ShellVerifier;
use crate::infra::config::{Config, load_config};
use crate::infra::context::collect_project_context;
use crate::infra::logging::{LogSink, TracingSink};
use crate::infra::walk::FileWalker;

/// Expand `~` and `$VAR` in the workspace argument.
pub fn resolve_workspace(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw).with_context(|| format!("Failed to expand workspace path: {raw}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Build the request from flags, falling back to config for the commands.
pub fn build_request(
    action: Action,
    args: &MigrateArgs,
    cfg: &Config,
) -> Result<MigrationRequest> {
    let request = MigrationRequest {
        lint_command: args
            .lint
            .clone()
            .or_else(|| cfg.commands.lint.clone())
            .unwrap_or_default(),
        test_command: args
            .test
            .clone()
            .or_else(|| cfg.commands.test.clone())
            .unwrap_or_default(),
        file_glob: args.files.clone(),
        find: args.find.clone(),
        replace: args.replace.clone().unwrap_or_default(),
        stop_policy: args
            .stop
            .unwrap_or_else(|| action.default_stop_policy()),
        action,
    };

    let missing = request.missing_fields();
    if !missing.is_empty() {
        let flags: Vec<String> = missing.iter().map(|f| format!("--{f}")).collect();
        bail!("missing required options: {}", flags.join(", "));
    }
    Ok(request)
}

#[instrument(skip_all, fields(action = ?action))]
pub fn run(
    action: Action,
    args: MigrateArgs,
    ctx: &AppContext,
) -> Result<()> {
    let workspace = resolve_workspace(&args.workspace)?;
    let cfg = load_config(&workspace)?;
    let request = build_request(action, &args, &cfg)?;

    let walker = FileWalker::new(&cfg.ignore_patterns)?;
    let context = if workspace.is_dir() {
        collect_project_context(&workspace, &cfg.context_glob, &walker)?
    } else {
        String::new()
    };
    if context.is_empty() {
        warn!(glob = %cfg.context_glob, "no project context files found");
    }

    let sink: Arc<dyn LogSink> = Arc::new(TracingSink);
    let client = StreamingProcessClient::new(cfg.llm.client_options(&workspace), Arc::clone(&sink));

    let mut orchestrator = MigrationOrchestrator::new(Arc::new(client), Arc::new(ShellVerifier), sink, workspace)
        .with_context(context)
        .with_walker(walker)
        .with_max_fix_attempts(cfg.verify.max_fix_attempts)
        .with_required_credential(cfg.llm.api_key_env.clone());

    // Not wired to a signal handler; embedders hold their own clone
    let cancel = CancellationToken::new();
    let outcome = orchestrator.run(&request, &cancel)?;

    if let (Some(path), RunOutcome::Migrated(_)) = (&args.history, &outcome) {
        orchestrator.history().write_json(path)?;
        info!(path = %path.display(), "burndown history written");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match &outcome {
        RunOutcome::Counted(report) => print_count(report, ctx),
        RunOutcome::Migrated(report) => print_run(report, ctx),
    }
    Ok(())
}

fn print_count(
    report: &CountReport,
    ctx: &AppContext,
) {
    let total = report.total.to_string();
    let total = if ctx.no_color { total } else { total.bold().to_string() };
    println!(
        "{total} pattern occurrences in {} of {} files{}",
        report.files_with_patterns,
        report.files_scanned,
        if report.cancelled { " (cancelled)" } else { "" }
    );
}

fn print_run(
    report: &RunReport,
    ctx: &AppContext,
) {
    let mark = if report.failed == 0 { "✓" } else { "✗" };
    let mark = match (ctx.no_color, report.failed == 0) {
        (true, _) => mark.to_string(),
        (false, true) => mark.green().to_string(),
        (false, false) => mark.red().to_string(),
    };

    println!(
        "{mark} {} processed: {} succeeded, {} failed, {} skipped",
        report.processed, report.succeeded, report.failed, report.skipped
    );
    if !ctx.quiet {
        println!(
            "  patterns fixed: {}, remaining: {}",
            report.patterns_fixed, report.remaining
        );
    }
    if report.cancelled {
        let note = "  run was cancelled";
        println!("{}", if ctx.no_color { note.to_string() } else { note.yellow().to_string() });
    } else if report.stopped_early {
        println!("  stopped early per --stop policy");
    }
}
