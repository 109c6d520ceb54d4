//! Applying batches of documents to the cluster
//!
//! [`ClusterApply`] is the primitive: one call submits one batch.
//! [`ApplyEngine`] wraps it with progress output and the apply retry policy.

use async_trait::async_trait;
use gamelab_core::Document;
use kube::{
    Client,
    api::{Api, DynamicObject, Patch, PatchParams},
    core::{GroupVersionKind, TypeMeta},
    discovery::{Discovery, Scope},
};

use crate::context::LabContext;
use crate::error::{KubeError, Result};
use crate::progress::ProgressReporter;
use crate::retry::{RetryPolicy, retry};

/// Field manager name for Server-Side Apply
const FIELD_MANAGER: &str = "gamelab";

/// Submits a batch of documents to the cluster
#[async_trait]
pub trait ClusterApply: Send + Sync {
    /// Apply every document. A failure of any document fails the batch with
    /// [`KubeError::Apply`] carrying the diagnostic text.
    async fn apply(&self, documents: &[Document]) -> Result<()>;
}

/// Server-Side Apply through the Kubernetes API
pub struct ServerSideApply {
    client: Client,
}

impl ServerSideApply {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_context(context: &LabContext) -> Self {
        Self::new(context.client().clone())
    }

    async fn apply_one(&self, discovery: &Discovery, document: &Document) -> Result<()> {
        let obj: DynamicObject = serde_json::from_value(document.to_value())?;
        let type_meta = obj.types.as_ref().ok_or_else(|| {
            KubeError::InvalidManifest(format!("{} has no apiVersion", document.identity()))
        })?;

        let gvk = gvk_from_type_meta(type_meta);
        let (api_resource, capabilities) = discovery.resolve_gvk(&gvk).ok_or_else(|| {
            KubeError::InvalidManifest(format!(
                "unknown resource type {}/{}",
                type_meta.api_version, type_meta.kind
            ))
        })?;

        let api: Api<DynamicObject> = if capabilities.scope == Scope::Namespaced {
            let namespace = document.namespace().unwrap_or("default");
            Api::namespaced_with(self.client.clone(), namespace, &api_resource)
        } else {
            Api::all_with(self.client.clone(), &api_resource)
        };

        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(document.name(), &params, &Patch::Apply(&obj)).await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterApply for ServerSideApply {
    async fn apply(&self, documents: &[Document]) -> Result<()> {
        // Discovery runs per batch so CRDs registered by an earlier batch
        // resolve in later ones
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(|e| KubeError::Apply {
                message: format!("API discovery failed: {}", e),
            })?;

        let mut failures = Vec::new();
        for document in documents {
            if let Err(e) = self.apply_one(&discovery, document).await {
                tracing::debug!(resource = %document.identity(), error = %e, "apply failed");
                failures.push(format!("{}: {}", document.identity(), e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(KubeError::Apply {
                message: failures.join("\n"),
            })
        }
    }
}

/// Applies batches with progress output and retries
pub struct ApplyEngine<'a, A: ClusterApply + ?Sized> {
    cluster: &'a A,
    reporter: &'a ProgressReporter,
    policy: RetryPolicy,
}

impl<'a, A: ClusterApply + ?Sized> ApplyEngine<'a, A> {
    pub fn new(cluster: &'a A, reporter: &'a ProgressReporter) -> Self {
        Self {
            cluster,
            reporter,
            policy: RetryPolicy::apply(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Apply one batch. An empty batch succeeds without touching the cluster.
    pub async fn apply(&self, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        for document in documents {
            self.reporter.step(&format!("Applying {}...", document.identity()));
        }

        let cluster = self.cluster;
        let reporter = self.reporter;
        retry(&self.policy, "Apply", move || async move {
            cluster
                .apply(documents)
                .await
                .inspect_err(|e| reporter.failure(&e.to_string()))
        })
        .await?;

        self.reporter.success(&format!(
            "Applied {} manifest(s) successfully",
            documents.len()
        ));
        Ok(())
    }
}

/// Convert TypeMeta to GroupVersionKind
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };

    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}
