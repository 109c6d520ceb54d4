//! Deploy command - customize manifests and apply them in order

use std::path::{Path, PathBuf};
use std::time::Duration;

use gamelab_core::{LabConfig, ManifestStore};
use gamelab_engine::{Customizer, ManifestLoader};
use gamelab_kube::{Deployer, KubeCrdLookup, LabContext, ProgressReporter, ServerSideApply};

use crate::error::Result;

pub async fn run(
    config_path: &Path,
    kubeconfig: Option<&Path>,
    manifests: &[PathBuf],
    crd_timeout: Option<u64>,
) -> Result<()> {
    let reporter = ProgressReporter::new();
    let config = super::load_config(config_path)?;

    // Everything local is checked before touching the cluster
    let store = load_manifests(&config, manifests, &reporter)?;

    let context = LabContext::connect(config, kubeconfig).await?;
    let cluster = ServerSideApply::from_context(&context);
    let crds = KubeCrdLookup::from_context(&context);

    Deployer::new(&cluster, &crds, &reporter)
        .with_crd_timeout(crd_timeout.map(Duration::from_secs))
        .deploy(&store)
        .await?;

    reporter.success("Deployment complete");
    Ok(())
}

/// Load, render and customize every manifest under `paths`
pub fn load_manifests(
    config: &LabConfig,
    paths: &[PathBuf],
    reporter: &ProgressReporter,
) -> Result<ManifestStore> {
    let loader = ManifestLoader::new(config)?;

    let mut documents = Vec::new();
    for file in loader.collect_files(paths)? {
        reporter.step(&format!("Loading manifest {}...", file.display()));
        documents.extend(loader.load_file(&file)?);
    }

    let customized = Customizer::new(config).customize(&documents);
    for change in &customized.changes {
        reporter.detail(&change.to_string());
    }

    Ok(customized.documents.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;

    fn config() -> LabConfig {
        LabConfig::from_json(
            r#"{
                "nginx": { "base_url": "https://lab.example.com" },
                "arma3": {
                    "hostname": "Example Arma Server",
                    "admin_password": "adminpw",
                    "server_password": "serverpw",
                    "server_command_password": "commandpw",
                    "steamcmd": { "username": "exampleuser", "password": "steampw" },
                    "mods": []
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_load_manifests_reports_files_and_changes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("web.yaml"),
            "apiVersion: networking.k8s.io/v1\nkind: Ingress\nmetadata:\n  name: web\nspec:\n  rules:\n    - http: {}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let reporter = ProgressReporter::captured();
        let store = load_manifests(&config(), &[dir.path().to_path_buf()], &reporter).unwrap();

        assert_eq!(store.len(), 1);
        let lines = reporter.lines();
        assert!(lines[0].starts_with("Loading manifest "));
        assert!(lines[0].ends_with("web.yaml..."));
        assert!(lines.iter().any(|l| l.starts_with("Customizing Ingress web: Configuring TLS")));
    }

    #[test]
    fn test_load_manifests_missing_path() {
        let reporter = ProgressReporter::captured();
        let err = load_manifests(&config(), &[PathBuf::from("/no/such/manifests")], &reporter).unwrap_err();
        assert!(matches!(err, CliError::Manifest { .. }));
    }
}
