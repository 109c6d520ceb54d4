//! CLI commands

use std::path::Path;

use gamelab_core::LabConfig;

use crate::error::Result;

pub mod deploy;
pub mod update_mods;
pub mod verify;

fn load_config(path: &Path) -> Result<LabConfig> {
    tracing::debug!(path = %path.display(), "loading lab configuration");
    Ok(LabConfig::from_file(path)?)
}
