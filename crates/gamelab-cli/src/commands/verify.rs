//! Verify command - check that the deployed lab is ready

use std::path::Path;

use gamelab_kube::verify::{EXPECTED_WORKLOADS, ExpectedWorkload};
use gamelab_kube::{ClusterInventory, KubeInventory, LabContext, ProgressReporter, Verifier};

use crate::error::{CliError, Result};

pub async fn run(config_path: &Path, kubeconfig: Option<&Path>) -> Result<()> {
    let reporter = ProgressReporter::new();
    let config = super::load_config(config_path)?;

    let context = LabContext::connect(config, kubeconfig).await?;
    let inventory = KubeInventory::from_context(&context);

    check(&inventory, EXPECTED_WORKLOADS, &reporter).await
}

/// Fails with a cluster error when any check fails
pub async fn check<I: ClusterInventory + ?Sized>(
    inventory: &I,
    expected: &[ExpectedWorkload],
    reporter: &ProgressReporter,
) -> Result<()> {
    let report = Verifier::new(inventory, reporter).with_expected(expected).verify().await?;

    if report.is_healthy() {
        Ok(())
    } else {
        Err(CliError::Cluster {
            message: report.summary(),
            help: Some("re-run `gamelab verify` once the listed resources settle".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_codes;
    use gamelab_kube::{Inventory, MockCluster};
    use serde_json::json;

    const ARMA3: &[ExpectedWorkload] = &[ExpectedWorkload {
        kind: "StatefulSet",
        namespace: "arma3",
        name: "arma3",
    }];

    fn inventory(claim_phase: &str) -> Inventory {
        Inventory {
            stateful_sets: vec![
                serde_json::from_value(json!({
                    "metadata": { "name": "arma3", "namespace": "arma3" },
                    "status": { "replicas": 1, "readyReplicas": 1 }
                }))
                .unwrap(),
            ],
            claims: vec![
                serde_json::from_value(json!({
                    "metadata": { "name": "arma3-data", "namespace": "arma3" },
                    "status": { "phase": claim_phase }
                }))
                .unwrap(),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ready_lab_passes() {
        let cluster = MockCluster::new();
        cluster.set_inventory(inventory("Bound"));
        let reporter = ProgressReporter::captured();

        check(&cluster, ARMA3, &reporter).await.unwrap();
        assert_eq!(reporter.lines().last().unwrap(), "Healthy: 2 resources ready");
    }

    #[tokio::test]
    async fn test_unbound_claim_fails_with_cluster_error() {
        let cluster = MockCluster::new();
        cluster.set_inventory(inventory("Pending"));
        let reporter = ProgressReporter::captured();

        let err = check(&cluster, ARMA3, &reporter).await.unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::CLUSTER_ERROR);
        assert_eq!(err.to_string(), "Unhealthy: 1 of 2 checks failed");
        assert!(reporter.lines().iter().any(|l| l.contains("arma3-data") && l.ends_with("phase=Pending")));
    }

    #[tokio::test]
    async fn test_missing_workload_fails() {
        let cluster = MockCluster::new();
        let reporter = ProgressReporter::captured();

        let err = check(&cluster, ARMA3, &reporter).await.unwrap_err();
        assert_eq!(err.to_string(), "Unhealthy: 1 of 1 checks failed");
    }
}
