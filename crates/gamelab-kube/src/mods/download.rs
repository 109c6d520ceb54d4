//! steamcmd workshop downloads

use gamelab_core::ModSpec;

use crate::pods::RemoteCommand;

use super::{ARMA3_APP_ID, INSTALL_DIR};

/// Variables of the steamcmd container holding the Steam login. They are
/// filled from a Secret rendered from the lab configuration, so the
/// credentials never appear in the exec request.
pub const USERNAME_ENV: &str = "STEAM_USERNAME";
pub const PASSWORD_ENV: &str = "STEAM_PASSWORD";

/// steamcmd prints this when Steam throttles the account
pub const RATE_LIMIT_MARKER: &str = "FAILED (Rate Limit Exceeded)";

/// steamcmd prints this after a completed download
pub const SUCCESS_MARKER: &str = "Success. Downloaded item";

/// Outcome of a download attempt, read from steamcmd's output.
///
/// steamcmd's exit status is unreliable (it segfaults after successful
/// downloads), so only the text counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded,
    RateLimited,
    Failed,
}

pub fn classify_download(output: &str) -> DownloadOutcome {
    if output.contains(RATE_LIMIT_MARKER) {
        DownloadOutcome::RateLimited
    } else if output.contains(SUCCESS_MARKER) {
        DownloadOutcome::Downloaded
    } else {
        DownloadOutcome::Failed
    }
}

/// steamcmd invocation downloading one workshop item, run with a TTY so
/// steamcmd flushes its progress output
pub fn download_command(spec: &ModSpec) -> RemoteCommand {
    RemoteCommand::shell(format!(
        "steamcmd +force_install_dir {} +login \"${}\" \"${}\" +workshop_download_item {} {} +quit",
        INSTALL_DIR, USERNAME_ENV, PASSWORD_ENV, ARMA3_APP_ID, spec.workshop_id,
    ))
    .with_tty()
}
