//! `jubilee-update download`: download and verify the candidate, checking
//! first when none is known yet.

use super::common::AgentContext;
use crate::update::{UpdateEvent, UpdateStatus};
use crate::utils::progress::DownloadBar;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;

#[derive(Args, Debug)]
pub struct DownloadCommand {}

impl DownloadCommand {
    pub async fn execute(self, context: &AgentContext) -> Result<()> {
        let _lock = context.lock()?;
        let mut machine = context.machine(false)?;

        let bar = DownloadBar::new("Downloading");
        let mut events = machine.events().subscribe();
        let render = {
            let bar = bar.clone();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(UpdateEvent::DownloadProgress(progress)) => bar.update(&progress),
                        Ok(UpdateEvent::StateChanged(_)) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        };

        let state = machine.request_download().await;
        render.abort();
        bar.finish();

        if let Some(error) = machine.take_last_failure() {
            return Err(error.into());
        }

        match (state.status, &state.available_version) {
            (UpdateStatus::Downloaded, Some(version)) => {
                println!("{} {} downloaded and verified", "✓".green(), version);
                println!("Run {} to install it.", "jubilee-update install --session <file>".cyan());
            }
            _ => println!("{} ({})", "Jubilee Browser is up to date".green(), state.current_version),
        }
        Ok(())
    }
}
