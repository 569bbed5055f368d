#![forbid(unsafe_code)]

mod cmd;
mod output;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use devops_core::fetch::CancelToken;
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "dva: Azure DevOps work-item hierarchy and status checks",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format (overrides DVA_FORMAT and TTY detection).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Config file to use instead of the platform default.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Hierarchy",
        about = "Show open epics with their descendants",
        long_about = "Fetch every open epic under an area path, assemble the full parent/child tree, and flag parents whose state disagrees with their children.",
        after_help = "EXAMPLES:\n    # Use the default area from config\n    dva tree\n\n    # Explicit area, machine-readable\n    dva tree --area 'Contoso\\Web' --json"
    )]
    Tree(cmd::tree::TreeArgs),

    #[command(
        next_help_heading = "Hierarchy",
        about = "Show trees from a recursive link query",
        after_help = "EXAMPLES:\n    # Active items tagged backend\n    dva links --state Active --tags backend"
    )]
    Links(cmd::tree::LinksArgs),

    #[command(
        next_help_heading = "Hierarchy",
        about = "Move inconsistent parents to their expected state",
        long_about = "Assemble the epic hierarchy and update every parent whose state disagrees with its children. Use --dry-run to only list the planned changes.",
        after_help = "EXAMPLES:\n    # Preview\n    dva fix --dry-run\n\n    # Apply\n    dva fix"
    )]
    Fix(cmd::tree::FixArgs),

    #[command(
        next_help_heading = "Reports",
        about = "List epics, features and stories in the given states"
    )]
    Validate(cmd::validate::ValidateArgs),

    #[command(
        next_help_heading = "Reports",
        about = "List user stories with their feature and epic"
    )]
    Stories(cmd::validate::StoriesArgs),

    #[command(
        next_help_heading = "Reports",
        about = "Search work items by title or id"
    )]
    Search(cmd::search::SearchArgs),

    #[command(
        next_help_heading = "Reports",
        about = "Count stories and bugs closed since a date",
        after_help = "EXAMPLES:\n    # Last 30 days (default)\n    dva metrics\n\n    # Since a fixed date\n    dva metrics --since 2024-01-01"
    )]
    Metrics(cmd::search::MetricsArgs),

    #[command(next_help_heading = "Hierarchy", about = "Set one work item's state")]
    SetState(cmd::set_state::SetStateArgs),

    #[command(
        next_help_heading = "Offline",
        about = "Print a WIQL query without running it"
    )]
    Wiql(cmd::wiql::WiqlArgs),

    #[command(
        next_help_heading = "Offline",
        about = "Print the normalized form of an area path"
    )]
    Area(cmd::area::AreaArgs),

    #[command(next_help_heading = "Setup", about = "Inspect or edit the config file")]
    Config(cmd::config::ConfigArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    dva completions bash"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("DVA_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "devops_core=debug,dva=debug,info"
        } else {
            "devops_core=info,dva=info,warn"
        })
    });

    let format = env::var("DVA_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let output = cli.output_mode();
    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || on_interrupt.cancel())
        .context("Failed to set Ctrl+C handler")?;

    let ctx = cmd::Context {
        config_path: cli.config.clone(),
        output,
        cancel,
    };
    debug!(command = ?cli.command, "dispatching");

    let command_result = match cli.command {
        Commands::Tree(ref args) => cmd::tree::run_tree(args, &ctx),
        Commands::Links(ref args) => cmd::tree::run_links(args, &ctx),
        Commands::Fix(ref args) => cmd::tree::run_fix(args, &ctx),
        Commands::Validate(ref args) => cmd::validate::run_validate(args, &ctx),
        Commands::Stories(ref args) => cmd::validate::run_stories(args, &ctx),
        Commands::Search(ref args) => cmd::search::run_search(args, &ctx),
        Commands::Metrics(ref args) => cmd::search::run_metrics(args, &ctx),
        Commands::SetState(ref args) => cmd::set_state::run_set_state(args, &ctx),
        Commands::Wiql(ref args) => cmd::wiql::run_wiql(args, &ctx),
        Commands::Area(ref args) => cmd::area::run_area(args, &ctx),
        Commands::Config(ref args) => cmd::config::run_config(args, &ctx),
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    };

    if let Err(err) = command_result {
        render_error(output, &CliError::from(&err))?;
        std::process::exit(1);
    }
    Ok(())
}
