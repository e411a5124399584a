//! `jubilee-update confirm`: the browser launched steadily after an update.

use super::common::AgentContext;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct ConfirmCommand {}

impl ConfirmCommand {
    pub fn execute(self, context: &AgentContext) -> Result<()> {
        let _lock = context.lock()?;

        if context.marker().exists() {
            println!(
                "{} an update is still pending; run {} first",
                "warning:".yellow().bold(),
                "jubilee-update recover".cyan()
            );
            return Ok(());
        }

        context.sessions().acknowledge_upgrade()?;
        let pruned = context.controller()?.confirm_launch()?;
        if pruned {
            println!("{} launch confirmed, backup removed", "✓".green());
        } else {
            println!("{} launch confirmed", "✓".green());
        }
        Ok(())
    }
}
