//! prherd - evaluate and merge pull requests across GitHub and GitLab

mod cli;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cli::style::Stylize;
use cli::{CommandContext, MergeOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Evaluate and merge pull requests across hosting services
#[derive(Parser, Debug)]
#[command(name = "prherd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report the readiness of every open pull request
    Check,

    /// Merge every pull request that is ready
    Merge {
        /// Show what would be merged without merging
        #[arg(long)]
        dry_run: bool,

        /// Merge pull requests that are skipped or not ready
        #[arg(long)]
        force: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "pr_herd=debug,prherd=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let ctx = CommandContext::new(cli.config.as_deref()).context("failed to start")?;

    match cli.command {
        Commands::Check => {
            cli::run_check(&ctx).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Merge {
            dry_run,
            force,
            yes,
        } => {
            let options = MergeOptions {
                dry_run,
                force,
                yes,
            };
            let failed = cli::run_merge(&ctx, options).await?;
            Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            anstream::eprintln!("{} {e:#}", "error:".error());
            ExitCode::FAILURE
        }
    }
}
