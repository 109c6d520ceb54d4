//! Ordered deployment of a manifest set

use std::time::Duration;

use gamelab_core::ManifestStore;

use crate::apply::{ApplyEngine, ClusterApply};
use crate::crd::{CrdLookup, ReadinessWaiter};
use crate::error::Result;
use crate::progress::ProgressReporter;
use crate::retry::RetryPolicy;

/// Kinds applied after CRDs, one batch per group, before the full set
pub const APPLY_GROUPS: [&[&str]; 3] = [
    &["ClusterRole", "Role", "ServiceAccount"],
    &["ClusterRoleBinding", "RoleBinding"],
    &["ConfigMap", "Secret", "Service"],
];

/// Sequences apply batches and CRD readiness gates.
///
/// Order: Namespaces, CRDs (then wait for each), the [`APPLY_GROUPS`], and
/// finally every document. Documents in earlier batches are applied again
/// in the final batch, which is harmless since apply is idempotent.
pub struct Deployer<'a, A: ClusterApply + ?Sized, L: CrdLookup + ?Sized> {
    cluster: &'a A,
    crds: &'a L,
    reporter: &'a ProgressReporter,
    apply_policy: RetryPolicy,
    crd_timeout: Option<Duration>,
}

impl<'a, A: ClusterApply + ?Sized, L: CrdLookup + ?Sized> Deployer<'a, A, L> {
    pub fn new(cluster: &'a A, crds: &'a L, reporter: &'a ProgressReporter) -> Self {
        Self {
            cluster,
            crds,
            reporter,
            apply_policy: RetryPolicy::apply(),
            crd_timeout: None,
        }
    }

    pub fn with_apply_policy(mut self, policy: RetryPolicy) -> Self {
        self.apply_policy = policy;
        self
    }

    /// Give up waiting for a CRD after `timeout` instead of waiting forever
    pub fn with_crd_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.crd_timeout = timeout;
        self
    }

    pub async fn deploy(&self, store: &ManifestStore) -> Result<()> {
        let engine = ApplyEngine::new(self.cluster, self.reporter).with_policy(self.apply_policy);

        engine.apply(&store.filter_by_kind(&["Namespace"])).await?;

        let crds = store.filter_by_kind(&["CustomResourceDefinition"]);
        engine.apply(&crds).await?;
        if !crds.is_empty() {
            let mut waiter = ReadinessWaiter::new(self.crds, self.reporter);
            if let Some(timeout) = self.crd_timeout {
                waiter = waiter.with_timeout(timeout);
            }
            for crd in &crds {
                waiter.wait_for_crd(crd.name()).await?;
            }
            self.reporter.success(&format!(
                "Verified {} CustomResourceDefinition(s)",
                crds.len()
            ));
        }

        for kinds in APPLY_GROUPS {
            engine.apply(&store.filter_by_kind(kinds)).await?;
        }

        engine.apply(store.documents()).await
    }
}
