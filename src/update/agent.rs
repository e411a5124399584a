//! Background driver for an [`UpdateMachine`].
//!
//! The agent owns the machine and is the only task that touches it. Other
//! parts of the browser talk to it through an [`AgentHandle`], so a manual
//! check or an install request never races the timer.

use super::machine::{InstallOutcome, UpdateMachine};
use super::schedule::Clock;
use super::state::UpdateState;
use crate::apply::ApplyController;
use crate::core::{UpdateError, UpdateResult};
use crate::download::PackageSource;
use crate::manifest::ReleaseSource;
use crate::session::{SessionCapture, SessionManager};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

enum AgentCommand {
    CheckNow {
        reply: oneshot::Sender<UpdateState>,
    },
    DownloadNow {
        reply: oneshot::Sender<UpdateState>,
    },
    Install {
        capture: SessionCapture,
        reply: oneshot::Sender<UpdateResult<InstallOutcome>>,
    },
}

/// Cloneable front door to a running [`UpdateAgent`].
#[derive(Debug, Clone)]
pub struct AgentHandle {
    commands: mpsc::Sender<AgentCommand>,
}

impl std::fmt::Debug for AgentCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CheckNow { .. } => f.write_str("CheckNow"),
            Self::DownloadNow { .. } => f.write_str("DownloadNow"),
            Self::Install { .. } => f.write_str("Install"),
        }
    }
}

impl AgentHandle {
    /// Asks for an immediate check and returns the state afterwards.
    ///
    /// # Errors
    ///
    /// [`UpdateError::Busy`] when the agent has stopped.
    pub async fn request_check(&self) -> UpdateResult<UpdateState> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentCommand::CheckNow {
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())
    }

    /// Asks for the pending update to be downloaded now.
    ///
    /// # Errors
    ///
    /// [`UpdateError::Busy`] when the agent has stopped.
    pub async fn request_download(&self) -> UpdateResult<UpdateState> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentCommand::DownloadNow {
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())
    }

    /// Asks the agent to install the downloaded update.
    ///
    /// # Errors
    ///
    /// [`UpdateError::Busy`] when the agent has stopped, otherwise whatever
    /// [`UpdateMachine::request_install`] reports.
    pub async fn request_install(&self, capture: SessionCapture) -> UpdateResult<InstallOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentCommand::Install {
            capture,
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())?
    }

    async fn send(&self, command: AgentCommand) -> UpdateResult<()> {
        self.commands.send(command).await.map_err(|_| stopped())
    }
}

fn stopped() -> UpdateError {
    UpdateError::Busy {
        operation: "agent is not running".to_string(),
    }
}

pub struct UpdateAgent<R, P, C> {
    machine: UpdateMachine<R, P, C>,
    sessions: SessionManager,
    controller: ApplyController,
    commands: mpsc::Receiver<AgentCommand>,
}

impl<R, P, C> UpdateAgent<R, P, C>
where
    R: ReleaseSource,
    P: PackageSource,
    C: Clock,
{
    pub fn new(
        machine: UpdateMachine<R, P, C>,
        sessions: SessionManager,
        controller: ApplyController,
    ) -> (Self, AgentHandle) {
        let (tx, rx) = mpsc::channel(8);
        let agent = Self {
            machine,
            sessions,
            controller,
            commands: rx,
        };
        (
            agent,
            AgentHandle {
                commands: tx,
            },
        )
    }

    #[must_use]
    pub fn machine(&self) -> &UpdateMachine<R, P, C> {
        &self.machine
    }

    /// Runs until `shutdown` flips to `true` or becomes unreachable.
    ///
    /// Dropping every handle does not stop the agent; only the timer is left
    /// then.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> UpdateMachine<R, P, C> {
        info!("Update agent started");
        let mut commands_open = true;

        loop {
            let sleep = sleep_for(self.delay_until_wake());
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                command = self.commands.recv(), if commands_open => {
                    match command {
                        Some(command) => self.handle(command).await,
                        None => {
                            debug!("All agent handles dropped");
                            commands_open = false;
                        }
                    }
                }
                () = sleep => {
                    self.machine.tick().await;
                }
            }
        }

        info!("Update agent stopped");
        self.machine
    }

    async fn handle(&mut self, command: AgentCommand) {
        debug!(?command, "Agent command");
        match command {
            AgentCommand::CheckNow {
                reply,
            } => {
                let state = self.machine.request_check().await;
                let _ = reply.send(state);
            }
            AgentCommand::DownloadNow {
                reply,
            } => {
                let state = self.machine.request_download().await;
                let _ = reply.send(state);
            }
            AgentCommand::Install {
                capture,
                reply,
            } => {
                let outcome = self.machine.request_install(capture, &self.sessions, &self.controller).await;
                let _ = reply.send(outcome);
            }
        }
    }

    fn delay_until_wake(&self) -> Option<Duration> {
        let wake = self.machine.next_wake_ms()?;
        Some(Duration::from_millis(wake.saturating_sub(self.machine.now_ms())))
    }
}

/// Sleeps for `delay`, or forever when there is nothing scheduled.
async fn sleep_for(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}
