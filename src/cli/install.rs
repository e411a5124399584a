//! `jubilee-update install`: snapshot the session and apply the staged update.

use super::common::{AgentContext, read_json_file};
use crate::session::SessionCapture;
use crate::update::InstallOutcome;
use crate::utils::progress::spinner;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InstallCommand {
    /// JSON file with the browser's current session (window, mode and tabs).
    #[arg(long, value_name = "FILE")]
    session: PathBuf,
}

impl InstallCommand {
    pub async fn execute(self, context: &AgentContext) -> Result<()> {
        let capture: SessionCapture = read_json_file(&self.session)
            .with_context(|| format!("Invalid session capture: {}", self.session.display()))?;

        let _lock = context.lock()?;
        let mut machine = context.machine(false)?;
        let sessions = context.sessions();
        let controller = context.controller()?;

        let progress = spinner("Installing update...");
        let outcome = machine.request_install(capture, &sessions, &controller).await;
        progress.finish_and_clear();

        match outcome? {
            InstallOutcome::RestartRequired {
                version,
            } => {
                println!("{} Jubilee Browser {} installed", "✓".green(), version);
                println!("Restart the browser to finish the update; your session will be restored.");
                Ok(())
            }
            InstallOutcome::RolledBack {
                message,
            } => {
                eprintln!("{} {}", "Update rolled back:".yellow().bold(), message);
                match machine.take_last_failure() {
                    Some(error) => Err(error.into()),
                    None => Err(anyhow::anyhow!(message)),
                }
            }
        }
    }
}
