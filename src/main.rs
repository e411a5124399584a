//! `jubilee-update` entry point.
//!
//! Parses the command line, runs the command and renders failures with
//! [`user_friendly_error`]. Exit codes: 0 on success, 1 on error, 2 when the
//! installation could not be restored and needs a manual reinstall.

use clap::Parser;
use jubilee_update::cli;
use jubilee_update::core::UpdateError;
use jubilee_update::core::error::user_friendly_error;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    if let Err(e) = cli.execute().await {
        let fatal = e
            .chain()
            .any(|cause| cause.downcast_ref::<UpdateError>().is_some_and(UpdateError::is_fatal));
        let error_ctx = user_friendly_error(e);
        error_ctx.display();
        std::process::exit(if fatal { 2 } else { 1 });
    }
}
