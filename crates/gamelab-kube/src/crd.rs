//! Waiting for CustomResourceDefinitions to be registered

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{Api, Client};

use crate::context::LabContext;
use crate::error::{KubeError, Result};
use crate::progress::ProgressReporter;
use crate::retry::{RetryPolicy, StopCondition, retry};

/// Whether a CRD exists in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrdPresence {
    Found,
    NotFound,
}

/// Looks up CRDs by name
#[async_trait]
pub trait CrdLookup: Send + Sync {
    /// A missing CRD is `Ok(NotFound)`; any other failure is an error
    async fn lookup(&self, name: &str) -> Result<CrdPresence>;
}

/// CRD lookup through the apiextensions API
pub struct KubeCrdLookup {
    api: Api<CustomResourceDefinition>,
}

impl KubeCrdLookup {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }

    pub fn from_context(context: &LabContext) -> Self {
        Self::new(context.client().clone())
    }
}

#[async_trait]
impl CrdLookup for KubeCrdLookup {
    async fn lookup(&self, name: &str) -> Result<CrdPresence> {
        match self.api.get(name).await.map_err(KubeError::from) {
            Ok(_) => Ok(CrdPresence::Found),
            Err(e) if e.is_not_found() => Ok(CrdPresence::NotFound),
            Err(e) => Err(e),
        }
    }
}

/// Polls a [`CrdLookup`] until CRDs exist.
///
/// Unbounded by default; [`ReadinessWaiter::with_timeout`] makes it give up
/// with [`KubeError::Timeout`].
pub struct ReadinessWaiter<'a, L: CrdLookup + ?Sized> {
    lookup: &'a L,
    reporter: &'a ProgressReporter,
    policy: RetryPolicy,
    timeout: Option<Duration>,
}

impl<'a, L: CrdLookup + ?Sized> ReadinessWaiter<'a, L> {
    pub fn new(lookup: &'a L, reporter: &'a ProgressReporter) -> Self {
        Self {
            lookup,
            reporter,
            policy: RetryPolicy::crd_poll(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.policy = self.policy.with_stop(StopCondition::Elapsed(timeout));
        self.timeout = Some(timeout);
        self
    }

    pub async fn wait_for_crd(&self, name: &str) -> Result<()> {
        let resource = format!("CustomResourceDefinition {}", name);
        self.reporter.step(&format!("Waiting for {}...", resource));

        let lookup = self.lookup;
        let resource_ref = resource.as_str();
        let result = retry(&self.policy, resource_ref, move || async move {
            match lookup.lookup(name).await? {
                CrdPresence::Found => Ok(()),
                CrdPresence::NotFound => Err(KubeError::NotReady {
                    resource: resource_ref.to_string(),
                }),
            }
        })
        .await;

        match (result, self.timeout) {
            (Err(KubeError::RetriesExhausted { .. }), Some(timeout)) => Err(KubeError::Timeout(
                format!("{} was not registered within {}s", resource, timeout.as_secs()),
            )),
            (result, _) => {
                if result.is_ok() {
                    tracing::debug!(crd = name, "CustomResourceDefinition registered");
                }
                result
            }
        }
    }
}
