//! Cluster connection and configuration shared by all commands

use std::path::Path;

use gamelab_core::LabConfig;
use kube::{
    Client, Config,
    config::{KubeConfigOptions, Kubeconfig},
};

use crate::error::{KubeError, Result};

/// Everything a command needs: the lab configuration and a cluster client.
///
/// Built once at startup and passed by reference.
pub struct LabContext {
    client: Client,
    config: LabConfig,
}

impl LabContext {
    pub fn new(client: Client, config: LabConfig) -> Self {
        Self { client, config }
    }

    /// Connect using an explicit kubeconfig file, or kube's default
    /// inference (`$KUBECONFIG`, `~/.kube/config`, in-cluster) without one
    pub async fn connect(config: LabConfig, kubeconfig: Option<&Path>) -> Result<Self> {
        let kube_config = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    KubeError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| KubeError::Config(e.to_string()))?
            }
            None => Config::infer()
                .await
                .map_err(|e| KubeError::Config(e.to_string()))?,
        };

        tracing::debug!(cluster_url = %kube_config.cluster_url, "connecting to cluster");
        let client = Client::try_from(kube_config)?;
        Ok(Self::new(client, config))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &LabConfig {
        &self.config
    }
}
