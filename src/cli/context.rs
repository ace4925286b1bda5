//! Shared command context for CLI commands
//!
//! Loads the configuration, builds the orchestrator and wires Ctrl-C to the
//! run's cancellation token.

use crate::cli::style::{Stylize, check, spinner_style};
use indicatif::ProgressBar;
use pr_herd::config::Config;
use pr_herd::error::{Error, Result};
use pr_herd::orchestrator::{Orchestrator, ProcessResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Everything a command needs for one run
pub struct CommandContext {
    /// Loaded configuration
    pub config: Config,
    /// Orchestrator over the configured providers
    pub orchestrator: Orchestrator,
    /// Fired on Ctrl-C
    pub cancel: CancellationToken,
}

impl CommandContext {
    /// Load configuration and prepare the run
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(config_path)?;
        debug!(path = %path.display(), "loading configuration");
        let config = Config::load(&path)?;
        let orchestrator = Orchestrator::from_config(&config)?;

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted, finishing in-flight requests...");
                on_interrupt.cancel();
            }
        });

        Ok(Self {
            config,
            orchestrator,
            cancel,
        })
    }

    /// Process every repository behind a spinner
    pub async fn process(&self) -> Result<Vec<ProcessResult>> {
        let count = self.orchestrator.targets().len();
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style());
        spinner.set_message(format!("Checking {} repositor{}...", count, plural_y(count)));
        spinner.enable_steady_tick(Duration::from_millis(80));

        let results = self.orchestrator.process(&self.cancel).await;

        match results {
            Ok(results) => {
                spinner.finish_with_message(format!(
                    "{} Checked {} repositor{}",
                    check(),
                    count.emphasis(),
                    plural_y(count)
                ));
                Ok(results)
            }
            Err(e) => {
                spinner.finish_and_clear();
                Err(e)
            }
        }
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let path = Config::default_path()
        .ok_or_else(|| Error::Config("could not determine the config directory".to_string()))?;
    if !path.exists() {
        return Err(Error::Config(format!(
            "no configuration found at {}; pass --config",
            path.display()
        )));
    }
    Ok(path)
}

const fn plural_y(count: usize) -> &'static str {
    if count == 1 { "y" } else { "ies" }
}
