use anyhow::Result;
use clap::Parser;
use gfactor::cli::{AppContext, Cli, Commands};
use gfactor::core::Action;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        verbose: cli.verbose,
        no_color: cli.no_color,
    };
    gfactor::infra::logging::init_tracing(ctx.verbose, ctx.quiet, ctx.no_color)?;

    match cli.command {
        Commands::Count(args) => gfactor::cli_ext::migrate_cmd::run(Action::CountOnly, args, &ctx),
        Commands::MigrateOne(args) => gfactor::cli_ext::migrate_cmd::run(Action::MigrateOneFile, args, &ctx),
        Commands::MigrateAll(args) => gfactor::cli_ext::migrate_cmd::run(Action::MigrateAllFiles, args, &ctx),
        Commands::Init(args) => gfactor::infra::config::init(args, &ctx),
        Commands::Completions(args) => gfactor::cli_ext::completions_cmd::run(args, &ctx),
    }
}
