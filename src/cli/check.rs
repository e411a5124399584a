//! `jubilee-update check`: one manual update check.

use super::common::{AgentContext, print_field};
use crate::update::{UpdateState, UpdateStatus};
use crate::utils::progress::spinner;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Print the resulting state as JSON.
    #[arg(long)]
    json: bool,
}

impl CheckCommand {
    pub async fn execute(self, context: &AgentContext) -> Result<()> {
        let _lock = context.lock()?;
        let mut machine = context.machine(false)?;

        let progress = spinner("Checking for updates...");
        let state = machine.request_check().await;
        progress.finish_and_clear();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&state)?);
        } else {
            report(&state);
        }

        match machine.take_last_failure() {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

fn report(state: &UpdateState) {
    match (state.status, &state.available_version) {
        (UpdateStatus::Available, Some(version)) => {
            println!("{} {}", "Update available:".green().bold(), version);
            print_field("current", &state.current_version);
            print_field("channel", state.channel);
            println!("Run {} to fetch it.", "jubilee-update download".cyan());
        }
        (UpdateStatus::Downloaded, Some(version)) => {
            println!("{} {} is downloaded and ready to install", "Update".green().bold(), version);
        }
        (UpdateStatus::Error, _) => {}
        _ => println!("{} ({})", "Jubilee Browser is up to date".green(), state.current_version),
    }
}
