#![forbid(unsafe_code)]

mod agent;
mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::Context;
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tally: a markdown task ledger shared by humans and bots",
    long_about = None
)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (defaults to pretty on a TTY, text when piped).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true)]
    json: bool,

    /// Acting agent (overrides TALLY_ACTOR and the user config).
    #[arg(long, global = true)]
    actor: Option<String>,

    /// Ledger file (overrides `.tally/config.toml`).
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Create an empty ledger",
        after_help = "EXAMPLES:\n    # New ledger in the current directory\n    tally init\n\n    # Custom id prefix\n    tally init --prefix WEB"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Read",
        about = "List tasks",
        after_help = "EXAMPLES:\n    # Open tasks\n    tally list\n\n    # Everything in progress or blocked\n    tally list -s in_progress -s blocked\n\n    # Machine-readable\n    tally list --json"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show one task with its history",
        after_help = "EXAMPLES:\n    tally show TASK-001\n\n    # Bare numbers use the project prefix\n    tally show 1"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Read",
        about = "Ready tasks nobody has claimed",
        after_help = "EXAMPLES:\n    tally next\n\n    tally next -n 1 --json"
    )]
    Next(cmd::next::NextArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Create a task",
        after_help = "EXAMPLES:\n    tally create --title \"Build auth\" --priority high\n\n    # With a dependency\n    tally create --title \"Deploy\" --depends-on TASK-001"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Claim a task for the current actor",
        after_help = "EXAMPLES:\n    tally claim TASK-001 --actor @alice"
    )]
    Claim(cmd::claim::ClaimArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Give up a claim",
        after_help = "EXAMPLES:\n    tally release TASK-001 --note \"waiting on review\""
    )]
    Release(cmd::claim::ReleaseArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Complete a task and unblock its dependents",
        after_help = "EXAMPLES:\n    tally done TASK-001 --note \"merged\""
    )]
    Done(cmd::done::DoneArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Reopen a done task",
        after_help = "EXAMPLES:\n    tally reopen TASK-001 --reason \"regressed\""
    )]
    Reopen(cmd::reopen::ReopenArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Change task fields",
        after_help = "EXAMPLES:\n    tally edit TASK-002 --status blocked --depends-on TASK-001\n\n    tally edit 3 --unassign --clear-due"
    )]
    Edit(cmd::update::EditArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Mark a deliverable done",
        after_help = "EXAMPLES:\n    tally deliverable TASK-001 \"API docs\"\n\n    tally deliverable TASK-001 \"API docs\" --undo"
    )]
    Deliverable(cmd::update::DeliverableArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Add a comment to a task's history",
        after_help = "EXAMPLES:\n    tally comment TASK-001 \"needs a rebase\""
    )]
    Comment(cmd::comment::CommentArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Delete a task (backs up first)",
        after_help = "EXAMPLES:\n    tally delete TASK-004\n\n    # Even if other tasks depend on it\n    tally delete TASK-004 --force"
    )]
    Delete(cmd::delete::DeleteArgs),

    #[command(next_help_heading = "Agents", about = "Manage the agent roster")]
    Agents {
        #[command(subcommand)]
        command: cmd::agents::AgentsCommand,
    },

    #[command(
        next_help_heading = "Maintenance",
        about = "Check ledger integrity",
        after_help = "EXAMPLES:\n    tally validate\n\n    # Fix a stale next_id\n    tally validate --repair"
    )]
    Validate(cmd::validate::ValidateArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Rewrite the ledger in canonical form"
    )]
    Fmt(cmd::validate::FmtArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Remove done tasks (backs up first)"
    )]
    Archive(cmd::archive::ArchiveArgs),

    #[command(next_help_heading = "Maintenance", about = "Ledger snapshots")]
    Backup {
        #[command(subcommand)]
        command: cmd::backup::BackupCommand,
    },
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TALLY_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "tally_core=debug,tally=debug,info"
        } else {
            "warn"
        })
    });

    let format = env::var("TALLY_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

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

    let project_root = env::current_dir()?;
    let config = tally_core::config::resolve_config(
        &project_root,
        cli.json || cli.format == Some(OutputMode::Json),
    )?;
    let output = cli
        .format
        .unwrap_or_else(|| OutputMode::from_resolved(&config.resolved_output));
    debug!(?output, root = %project_root.display(), "resolved cli context");

    let ctx = Context::new(project_root, output, config, cli.actor.clone(), cli.file.clone());

    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, &ctx),
        Commands::List(args) => cmd::list::run_list(args, &ctx),
        Commands::Show(args) => cmd::show::run_show(args, &ctx),
        Commands::Next(args) => cmd::next::run_next(args, &ctx),
        Commands::Create(args) => cmd::create::run_create(args, &ctx),
        Commands::Claim(args) => cmd::claim::run_claim(args, &ctx),
        Commands::Release(args) => cmd::claim::run_release(args, &ctx),
        Commands::Done(args) => cmd::done::run_done(args, &ctx),
        Commands::Reopen(args) => cmd::reopen::run_reopen(args, &ctx),
        Commands::Edit(args) => cmd::update::run_edit(args, &ctx),
        Commands::Deliverable(args) => cmd::update::run_deliverable(args, &ctx),
        Commands::Comment(args) => cmd::comment::run_comment(args, &ctx),
        Commands::Delete(args) => cmd::delete::run_delete(args, &ctx),
        Commands::Agents { command } => cmd::agents::run_agents(command, &ctx),
        Commands::Validate(args) => cmd::validate::run_validate(args, &ctx),
        Commands::Fmt(args) => cmd::validate::run_fmt(args, &ctx),
        Commands::Archive(args) => cmd::archive::run_archive(args, &ctx),
        Commands::Backup { command } => cmd::backup::run_backup(command, &ctx),
    }
}
