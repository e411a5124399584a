//! `jubilee-update run`: the long-running agent.
//!
//! Recovers an interrupted apply, then checks on a schedule and downloads
//! updates in the background until Ctrl-C. Installing stays an explicit
//! `install`, since it needs the browser's session.

use super::common::AgentContext;
use crate::apply::StartupRecovery;
use crate::update::{UpdateAgent, UpdateEvent, UpdateStatus};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct RunCommand {}

impl RunCommand {
    pub async fn execute(self, context: &AgentContext) -> Result<()> {
        let _lock = context.lock()?;
        let controller = context.controller()?;

        let recovery = controller.recover_on_startup().await?;
        if let StartupRecovery::RolledBack {
            restored_version,
            ..
        } = &recovery
        {
            warn!(version = %restored_version, "Rolled back an interrupted update");
            context.sessions().clear_pending_update()?;
        }

        let mut machine = context.machine(true)?;
        machine.record_interrupted_install(&recovery);
        let mut events = machine.events().subscribe();
        let (agent, _handle) = UpdateAgent::new(machine, context.sessions(), controller);

        let reporter = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(UpdateEvent::StateChanged(state)) => match (state.status, &state.available_version) {
                        (UpdateStatus::Downloaded, Some(version)) => {
                            println!("{} {} is ready to install", "Update".green().bold(), version);
                        }
                        (UpdateStatus::Error, _) => {
                            if let Some(error) = &state.last_error {
                                eprintln!("{} {}", "Update failed:".red().bold(), error);
                            }
                        }
                        _ => {}
                    },
                    Ok(UpdateEvent::DownloadProgress(_)) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown requested");
                    let _ = shutdown_tx.send(true);
                }
                Err(e) => {
                    warn!("Cannot listen for Ctrl-C, running until killed: {e}");
                    std::future::pending::<()>().await;
                }
            }
        });

        let machine = agent.run(shutdown_rx).await;
        info!(status = %machine.snapshot().status, "Agent exited");
        reporter.abort();
        Ok(())
    }
}
