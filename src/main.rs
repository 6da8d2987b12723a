//! socket-patch - backup and restore harness
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use socket_patch::cli::{Cli, Commands};
use socket_patch::config::{Config, ConfigManager};
use socket_patch::error::{PatchError, PatchResult};
use socket_patch::PatchContext;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, config: &Config) {
    // 0 = warn, 1 = info, 2+ = debug
    let filter = match verbose {
        0 => EnvFilter::new("socket_patch=warn"),
        1 => EnvFilter::new("socket_patch=info"),
        _ => EnvFilter::new("socket_patch=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

async fn run() -> PatchResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Loaded configuration from {}", config_manager.path().display());

    let project = match cli.project {
        Some(path) => path,
        None => std::env::current_dir()
            .map_err(|e| PatchError::io("getting current directory", e))?,
    };

    let ctx = PatchContext::new(&config);

    match cli.command {
        Commands::Backup(args) => socket_patch::cli::commands::backup(args, &ctx).await,
        Commands::Restore(args) => socket_patch::cli::commands::restore(args, &ctx).await,
        Commands::Cleanup(args) => socket_patch::cli::commands::cleanup(args, &ctx).await,
        Commands::List(args) => socket_patch::cli::commands::list(args, &ctx).await,
        Commands::Prune(args) => socket_patch::cli::commands::prune(args, &ctx, &config).await,
        Commands::Manifest(args) => {
            socket_patch::cli::commands::manifest(args, &ctx, &project).await
        }
        Commands::Status(args) => socket_patch::cli::commands::status(args, &ctx, &project).await,
        Commands::Cache(args) => socket_patch::cli::commands::cache(args, &ctx).await,
    }
}
