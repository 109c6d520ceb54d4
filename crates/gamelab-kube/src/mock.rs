//! In-memory cluster for testing
//!
//! Implements [`ClusterApply`], [`CrdLookup`], [`PodRuntime`] and
//! [`ClusterInventory`] without a Kubernetes cluster, recording every call
//! for assertions.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use gamelab_core::Document;

use crate::apply::ClusterApply;
use crate::crd::{CrdLookup, CrdPresence};
use crate::error::{KubeError, Result};
use crate::pods::{CommandResult, PodRuntime, RemoteCommand, TargetPod};
use crate::verify::{ClusterInventory, Inventory};

type ExecResponder =
    Arc<dyn Fn(&TargetPod, &str, &RemoteCommand) -> Result<CommandResult> + Send + Sync>;

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub applies: usize,
    pub lookups: usize,
    pub lists: usize,
    pub execs: usize,
    pub inventories: usize,
}

/// A recorded exec call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRecord {
    pub pod: String,
    pub container: String,
    pub script: String,
    pub tty: bool,
}

#[derive(Default)]
struct State {
    applied: Vec<Vec<Document>>,
    events: Vec<String>,
    failing_applies: u32,
    apply_failure: String,
    /// CRD name -> NotFound answers left before it is found
    crds: HashMap<String, u32>,
    lookup_failure: Option<String>,
    pods: Vec<(String, BTreeMap<String, String>, TargetPod)>,
    execs: Vec<ExecRecord>,
    inventory: Inventory,
    counts: OperationCounts,
}

/// In-memory cluster for testing
#[derive(Clone)]
pub struct MockCluster {
    state: Arc<Mutex<State>>,
    register_crds_on_apply: bool,
    responder: Option<ExecResponder>,
}

impl MockCluster {
    /// Applied CRDs become visible to lookups immediately
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            register_crds_on_apply: true,
            responder: None,
        }
    }

    /// Applied CRDs never become visible on their own
    pub fn without_crd_registration(mut self) -> Self {
        self.register_crds_on_apply = false;
        self
    }

    /// Make the next `count` applies fail with `message`
    pub fn fail_next_applies(&self, count: u32, message: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_applies = count;
        state.apply_failure = message.to_string();
    }

    /// Register a CRD that is reported missing `polls` times before it is found
    pub fn register_crd_after(&self, name: &str, polls: u32) {
        self.state
            .lock()
            .unwrap()
            .crds
            .insert(name.to_string(), polls);
    }

    /// Make every lookup fail with a server error
    pub fn fail_lookups(&self, message: &str) {
        self.state.lock().unwrap().lookup_failure = Some(message.to_string());
    }

    /// Add a running Pod with the given labels
    pub fn add_pod(&self, namespace: &str, labels: &[(&str, &str)], name: &str, containers: &[&str]) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let pod = TargetPod {
            name: name.to_string(),
            namespace: namespace.to_string(),
            containers: containers.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
        };
        self.state
            .lock()
            .unwrap()
            .pods
            .push((namespace.to_string(), labels, pod));
    }

    /// Snapshot returned by [`ClusterInventory::inventory`]
    pub fn set_inventory(&self, inventory: Inventory) {
        self.state.lock().unwrap().inventory = inventory;
    }

    /// Answer exec calls with `responder`. Without one every command
    /// succeeds with empty output.
    pub fn on_exec<F>(mut self, responder: F) -> Self
    where
        F: Fn(&TargetPod, &str, &RemoteCommand) -> Result<CommandResult> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Batches passed to `apply`, including failed attempts
    pub fn applied(&self) -> Vec<Vec<Document>> {
        self.state.lock().unwrap().applied.clone()
    }

    /// Ordered log of applies (one line per document) and lookups
    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn execs(&self) -> Vec<ExecRecord> {
        self.state.lock().unwrap().execs.clone()
    }

    pub fn counts(&self) -> OperationCounts {
        self.state.lock().unwrap().counts.clone()
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterApply for MockCluster {
    async fn apply(&self, documents: &[Document]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.counts.applies += 1;
        state.applied.push(documents.to_vec());
        for document in documents {
            state.events.push(format!("apply {} {}", document.kind(), document.name()));
        }

        if state.failing_applies > 0 {
            state.failing_applies -= 1;
            return Err(KubeError::Apply {
                message: state.apply_failure.clone(),
            });
        }

        if self.register_crds_on_apply {
            for document in documents {
                if document.kind() == "CustomResourceDefinition" {
                    state.crds.entry(document.name().to_string()).or_insert(0);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CrdLookup for MockCluster {
    async fn lookup(&self, name: &str) -> Result<CrdPresence> {
        let mut state = self.state.lock().unwrap();
        state.counts.lookups += 1;
        state.events.push(format!("lookup crd {}", name));

        if let Some(message) = &state.lookup_failure {
            return Err(KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: message.clone(),
                reason: "InternalError".to_string(),
                code: 500,
            })));
        }

        match state.crds.get_mut(name) {
            Some(0) => Ok(CrdPresence::Found),
            Some(remaining) => {
                *remaining -= 1;
                Ok(CrdPresence::NotFound)
            }
            None => Ok(CrdPresence::NotFound),
        }
    }
}

#[async_trait]
impl PodRuntime for MockCluster {
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<TargetPod>> {
        let mut state = self.state.lock().unwrap();
        state.counts.lists += 1;

        let wanted: Vec<(&str, &str)> = selector
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .collect();
        let mut pods: Vec<TargetPod> = state
            .pods
            .iter()
            .filter(|(ns, labels, _)| {
                ns == namespace
                    && wanted
                        .iter()
                        .all(|(k, v)| labels.get(*k).map(String::as_str) == Some(*v))
            })
            .map(|(_, _, pod)| pod.clone())
            .collect();
        pods.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(pods)
    }

    async fn exec(
        &self,
        pod: &TargetPod,
        container: &str,
        command: &RemoteCommand,
    ) -> Result<CommandResult> {
        {
            let mut state = self.state.lock().unwrap();
            state.counts.execs += 1;
            state.execs.push(ExecRecord {
                pod: pod.name.clone(),
                container: container.to_string(),
                script: command.script().to_string(),
                tty: command.tty(),
            });
        }

        match &self.responder {
            Some(responder) => responder(pod, container, command),
            None => Ok(CommandResult {
                stdout: String::new(),
                succeeded: true,
            }),
        }
    }
}

#[async_trait]
impl ClusterInventory for MockCluster {
    async fn inventory(&self) -> Result<Inventory> {
        let mut state = self.state.lock().unwrap();
        state.counts.inventories += 1;
        Ok(state.inventory.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_pods_matches_selector() {
        let cluster = MockCluster::new();
        cluster.add_pod(
            "arma3",
            &[("app.kubernetes.io/name", "arma3"), ("app.kubernetes.io/component", "server")],
            "arma3-0",
            &["arma3", "steamcmd"],
        );
        cluster.add_pod(
            "arma3",
            &[("app.kubernetes.io/name", "arma3"), ("app.kubernetes.io/component", "headless-client")],
            "arma3-headless-client-0",
            &["arma3", "steamcmd"],
        );
        cluster.add_pod("other", &[("app.kubernetes.io/name", "arma3")], "x", &[]);

        let servers = cluster
            .list_pods("arma3", "app.kubernetes.io/name=arma3,app.kubernetes.io/component=server")
            .await
            .unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "arma3-0");

        let all = cluster
            .list_pods("arma3", "app.kubernetes.io/name=arma3")
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_crd_registered_on_apply() {
        let cluster = MockCluster::new();
        assert_eq!(cluster.lookup("a.example.com").await.unwrap(), CrdPresence::NotFound);

        let crd = Document::new(serde_json::json!({
            "kind": "CustomResourceDefinition",
            "metadata": {"name": "a.example.com"}
        }))
        .unwrap();
        cluster.apply(&[crd]).await.unwrap();

        assert_eq!(cluster.lookup("a.example.com").await.unwrap(), CrdPresence::Found);
        assert_eq!(
            cluster.events(),
            vec![
                "lookup crd a.example.com",
                "apply CustomResourceDefinition a.example.com",
                "lookup crd a.example.com"
            ]
        );
    }
}
