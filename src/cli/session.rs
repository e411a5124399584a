//! `jubilee-update session`: inspect the saved browsing session.

use super::common::AgentContext;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args, Debug)]
pub struct SessionCommand {
    #[command(subcommand)]
    command: SessionSubcommand,
}

#[derive(Subcommand, Debug)]
enum SessionSubcommand {
    /// Print the saved snapshot, if it is valid.
    Show,
}

impl SessionCommand {
    pub fn execute(self, context: &AgentContext) -> Result<()> {
        match self.command {
            SessionSubcommand::Show => match context.sessions().restore() {
                Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                None => println!("no session"),
            },
        }
        Ok(())
    }
}
