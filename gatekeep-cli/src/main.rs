//! Gatekeep CLI - Command line interface for the commit review pipeline
//!
//! Agents submit changes to the review queue; the scheduler reviews, tests
//! and merges them; operators inspect and override from here.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gatekeep_core::{CliOverrides, Config};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{
    ActionArgs, CleanupArgs, CycleArgs, PendingArgs, RetrospectiveArgs, ServeArgs, ShowArgs,
    StatusArgs, SubmitArgs,
};

/// Gatekeep: review queue and auto-merge pipeline for agent commits
#[derive(Parser, Debug)]
#[command(name = "gatekeep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Queue database file (overrides config and env)
    #[arg(long, global = true, env = "GATEKEEP_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Repository approved changes are merged in (overrides config and env)
    #[arg(long, global = true, env = "GATEKEEP_REPO_PATH")]
    repo_path: Option<PathBuf>,

    /// Path to claude executable (overrides config and env)
    #[arg(long, global = true, env = "GATEKEEP_CLAUDE_PATH")]
    claude_path: Option<String>,

    /// Model to use (overrides config and env)
    #[arg(long, global = true, env = "GATEKEEP_MODEL")]
    model: Option<String>,

    /// Seconds between scheduler cycles
    #[arg(long, global = true)]
    poll_interval: Option<u64>,

    /// Maximum items reviewed per cycle
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Never merge automatically, leave approved items for an operator
    #[arg(long, global = true)]
    no_auto_merge: bool,

    /// Skip the tests an approval asks for
    #[arg(long, global = true)]
    no_tests: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            db_path: self.db_path.clone(),
            repo_path: self.repo_path.clone(),
            claude_path: self.claude_path.clone(),
            model: self.model.clone(),
            poll_interval: self.poll_interval.map(Duration::from_secs),
            batch_size: self.batch_size,
            auto_merge: self.no_auto_merge.then_some(false),
            run_tests: self.no_tests.then_some(false),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Submit a change for review
    #[command(visible_alias = "s")]
    Submit(SubmitArgs),

    /// Show queue statistics
    Status(StatusArgs),

    /// Show one queue item
    Show(ShowArgs),

    /// List items waiting for review
    Pending(PendingArgs),

    /// Approve, reject or request changes by hand
    Action(ActionArgs),

    /// Quality retrospective of an agent
    #[command(visible_alias = "retro")]
    Retrospective(RetrospectiveArgs),

    /// Remove merged items past the retention period
    Cleanup(CleanupArgs),

    /// Run a single review cycle
    Cycle(CycleArgs),

    /// Run the scheduler until interrupted
    Serve(ServeArgs),

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    // Load configuration with overrides
    let config = Config::load_with_overrides(cli.overrides())?;

    if cli.verbose {
        tracing::info!(
            db = %config.database.path.display(),
            repo = %config.integration.repo_path.display(),
            claude_path = %config.advisor.claude_path,
            model = ?config.advisor.model,
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("gatekeep {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Submit(args)) => args.execute(&config).await?,
        Some(Commands::Status(args)) => args.execute(&config).await?,
        Some(Commands::Show(args)) => args.execute(&config).await?,
        Some(Commands::Pending(args)) => args.execute(&config).await?,
        Some(Commands::Action(args)) => args.execute(&config).await?,
        Some(Commands::Retrospective(args)) => args.execute(&config).await?,
        Some(Commands::Cleanup(args)) => args.execute(&config).await?,
        Some(Commands::Cycle(args)) => args.execute(cli.verbose, &config).await?,
        Some(Commands::Serve(args)) => args.execute(cli.verbose, &config).await?,
        Some(Commands::Config) => {
            println!("# Effective configuration");
            if let Some(path) = Config::default_config_path() {
                if path.exists() {
                    println!("# loaded from {}", path.display());
                } else {
                    println!("# {} not found, using defaults", path.display());
                }
            }
            println!();
            print!("{}", config.to_toml()?);
        }
        None => {
            println!("Gatekeep - review queue and auto-merge pipeline");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
