//! `jubilee-update status`: persisted update state and recovery artifacts.

use super::common::{AgentContext, print_field};
use crate::update::{UpdateState, UpdateStatus};
use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::Args;
use colored::Colorize;
use serde_json::json;

#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Print the status as JSON.
    #[arg(long)]
    json: bool,
}

impl StatusCommand {
    pub fn execute(self, context: &AgentContext) -> Result<()> {
        let state = context
            .store()
            .read()?
            .unwrap_or_else(|| UpdateState::new(context.config.channel, context.current_version.clone()));
        let marker = context.marker().read().unwrap_or(None);
        let marker_present = context.marker().exists();
        let backup = context.backups().load().ok();
        let staged = context.staging().load_record();

        if self.json {
            let value = json!({
                "state": state,
                "pendingUpdate": marker,
                "pendingUpdateMarker": marker_present,
                "backup": backup,
                "staged": staged,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        let status = match state.status {
            UpdateStatus::Error => state.status.as_str().red().bold(),
            UpdateStatus::Downloaded => state.status.as_str().green().bold(),
            _ => state.status.as_str().bold(),
        };
        println!("{} {}", "Update status:".bold(), status);
        print_field("current version", &state.current_version);
        print_field("channel", state.channel);
        if let Some(version) = &state.available_version {
            print_field("available", version);
        }
        if let Some(progress) = state.download_progress {
            print_field("downloaded", format!("{progress}%"));
        }
        if let Some(at) = state
            .last_check_time
            .and_then(|ms| i64::try_from(ms).ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        {
            print_field("last check", at.to_rfc3339());
        }
        if let Some(error) = &state.last_error {
            print_field("last error", error.red());
            print_field("failures", state.consecutive_failures);
        }

        if let Some(staged) = &staged {
            let verified = if staged.verified { "verified".green() } else { "unverified".yellow() };
            print_field("staged", format!("{} ({verified})", staged.version));
        }
        if let Some(backup) = &backup {
            print_field("backup", format!("{} from {}", backup.source_version, backup.created_at.to_rfc3339()));
        }
        if marker_present {
            let detail = marker
                .map(|m| format!("{} -> {}", m.source_version, m.target_version))
                .unwrap_or_else(|| "unreadable".to_string());
            println!(
                "{} an interrupted update is pending ({detail}); run {}",
                "warning:".yellow().bold(),
                "jubilee-update recover".cyan()
            );
        }
        Ok(())
    }
}
