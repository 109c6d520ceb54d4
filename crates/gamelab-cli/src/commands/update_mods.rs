//! Update-mods command - sync workshop mods into the game server Pods

use std::path::Path;

use gamelab_kube::{KubePodRuntime, LabContext, ModSync, ProgressReporter};

use crate::error::Result;

pub async fn run(config_path: &Path, kubeconfig: Option<&Path>) -> Result<()> {
    let reporter = ProgressReporter::new();
    let config = super::load_config(config_path)?;

    let context = LabContext::connect(config, kubeconfig).await?;
    let runtime = KubePodRuntime::from_context(&context);

    ModSync::new(&runtime, &reporter).sync(&context.config().arma3).await?;
    Ok(())
}
