//! `jubilee-update recover`: roll back an apply interrupted by a crash.
//!
//! Meant to run before the browser starts. A fatal failure exits with code 2.

use super::common::AgentContext;
use crate::apply::StartupRecovery;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::warn;

#[derive(Args, Debug)]
pub struct RecoverCommand {}

impl RecoverCommand {
    pub async fn execute(self, context: &AgentContext) -> Result<()> {
        let _lock = context.lock()?;
        let controller = context.controller()?;

        let recovery = controller.recover_on_startup().await?;
        match &recovery {
            StartupRecovery::Clean => {
                println!("{}", "No interrupted update found".green());
            }
            StartupRecovery::RolledBack {
                restored_version,
                ..
            } => {
                context.machine(false)?.record_interrupted_install(&recovery);
                // The session is still restored, just not as an upgrade.
                if let Err(e) = context.sessions().clear_pending_update() {
                    warn!("Failed to clear pending-update flag on session: {e}");
                }
                println!(
                    "{} interrupted update rolled back, Jubilee Browser {} restored",
                    "✓".green(),
                    restored_version
                );
            }
        }
        Ok(())
    }
}
