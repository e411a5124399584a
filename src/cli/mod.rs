//! Command-line interface for the Jubilee update agent.
//!
//! # Commands
//!
//! - `check` - check for an update once
//! - `status` - show the persisted update state, staged package and backup
//! - `download` - check, then download and verify an available update
//! - `install` - snapshot the browser session and apply the staged update
//! - `recover` - roll back an update interrupted by a crash (exit code 2 if impossible)
//! - `confirm` - report a steady launch; prunes the backup
//! - `session show` - print the saved browsing session
//! - `run` - run the scheduling agent until Ctrl-C
//!
//! # Global options
//!
//! `--verbose` and `--quiet` pick the log level (`RUST_LOG` overrides both),
//! `--config` names the agent configuration file and `--no-progress` hides
//! progress bars.

mod check;
pub mod common;
mod confirm;
mod download;
mod install;
mod recover;
mod run;
mod session;
mod status;

use crate::logging::{LogOptions, RotatingLog, init_logging};
use crate::utils::progress::NO_PROGRESS_ENV;
use anyhow::Result;
use clap::{Parser, Subcommand};
use common::AgentContext;
use std::path::PathBuf;

/// Settings derived from the global flags, applied once before a command runs.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Default filter directive; `None` keeps the terminal quiet.
    pub log_level: Option<String>,
    pub no_progress: bool,
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Sets `JUBILEE_UPDATE_NO_PROGRESS` when progress is disabled.
    pub fn apply_to_env(&self) {
        if self.no_progress {
            // SAFETY: called from `main` before any other thread reads the environment.
            unsafe { std::env::set_var(NO_PROGRESS_ENV, "1") };
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "jubilee-update",
    about = "Jubilee Browser update agent",
    version,
    long_about = "Checks for, downloads, verifies and installs Jubilee Browser updates, \
                  keeping the browsing session across the restart."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show debug output.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Agent configuration file (defaults to `update-agent.json` in the data directory).
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Hide progress bars and spinners.
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check for an update once.
    Check(check::CheckCommand),

    /// Show the update state, staged package and backup.
    Status(status::StatusCommand),

    /// Check for an update and download it.
    Download(download::DownloadCommand),

    /// Snapshot the browser session and install the downloaded update.
    Install(install::InstallCommand),

    /// Roll back an update interrupted by a crash.
    Recover(recover::RecoverCommand),

    /// Confirm the browser started after an update and remove the backup.
    Confirm(confirm::ConfirmCommand),

    /// Inspect the saved browsing session.
    Session(session::SessionCommand),

    /// Run the update agent until interrupted.
    Run(run::RunCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("warn".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress || self.quiet,
            config_path: self.config.clone(),
        }
    }

    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.apply_to_env();

        let context = AgentContext::load(config.config_path.as_deref()).await?;
        install_logging(&config, &context);

        match self.command {
            Commands::Check(cmd) => cmd.execute(&context).await,
            Commands::Status(cmd) => cmd.execute(&context),
            Commands::Download(cmd) => cmd.execute(&context).await,
            Commands::Install(cmd) => cmd.execute(&context).await,
            Commands::Recover(cmd) => cmd.execute(&context).await,
            Commands::Confirm(cmd) => cmd.execute(&context),
            Commands::Session(cmd) => cmd.execute(&context),
            Commands::Run(cmd) => cmd.execute(&context).await,
        }
    }
}

/// Logging is best effort: a read-only data directory still lets commands run.
fn install_logging(config: &CliConfig, context: &AgentContext) {
    let file = match RotatingLog::open(context.paths.log_file(), context.config.log_max_bytes) {
        Ok(log) => Some(log),
        Err(e) => {
            eprintln!("Warning: file logging disabled: {e:#}");
            None
        }
    };

    let options = LogOptions {
        level: config.log_level.clone().unwrap_or_else(|| "error".to_string()),
        quiet: config.log_level.is_none(),
        file,
    };
    if let Err(e) = init_logging(options) {
        eprintln!("Warning: {e:#}");
    }
}
