//! Branchfarm CLI - keep one checkout per remote branch
//!
//! Mirrors remote branches of configured repositories into workspace
//! directories and removes workspaces whose branch is gone.

mod commands;

use std::path::PathBuf;

use branchfarm_core::Config;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{ConfigArgs, PlanArgs, StatusArgs, SyncArgs};

/// Branchfarm: one workspace per remote branch
#[derive(Parser, Debug)]
#[command(name = "branchfarm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (YAML or TOML)
    #[arg(short, long, global = true, env = "BRANCHFARM_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of repositories synchronized at once
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Synchronize workspaces with the remote branches
    #[command(visible_alias = "s")]
    Sync(SyncArgs),

    /// Show what a sync would do without changing anything
    Plan(PlanArgs),

    /// List the workspaces currently on disk
    Status(StatusArgs),

    /// Show current configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    let Some(command) = cli.command else {
        println!("Branchfarm - one workspace per remote branch");
        println!();
        println!("Use --help for usage information");
        return Ok(());
    };

    if let Commands::Version = command {
        println!("branchfarm {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration with overrides
    let config = Config::load_with_overrides(cli.config.as_deref(), cli.jobs)?;

    if cli.verbose {
        tracing::info!(
            source = ?config.source,
            repositories = config.repositories.len(),
            "Configuration loaded"
        );
    }

    match command {
        Commands::Sync(args) => args.execute(cli.verbose, &config).await?,
        Commands::Plan(args) => args.execute(cli.verbose, &config).await?,
        Commands::Status(args) => args.execute(cli.verbose, &config)?,
        Commands::Config(args) => args.execute(&config)?,
        Commands::Version => {}
    }

    Ok(())
}
