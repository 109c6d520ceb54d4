//! Post-deploy cluster readiness verification
//!
//! Checks, over one snapshot of the cluster:
//! - every Node reports `Ready`
//! - every Pod is Ready (completed Pods count as ready)
//! - Deployments are `Available`, StatefulSets have ready replicas and
//!   DaemonSets are fully scheduled and ready
//! - every PersistentVolumeClaim is `Bound`
//! - nothing runs in the namespaces the lab leaves unused
//! - the lab's well-known workloads exist

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Node, PersistentVolumeClaim, Pod};
use kube::{
    Client,
    api::{Api, ListParams},
};

use crate::context::LabContext;
use crate::error::Result;
use crate::progress::ProgressReporter;

/// Namespaces where no Pod should run
pub const UNUSED_NAMESPACES: [&str; 3] = ["default", "kube-public", "kube-node-lease"];

/// A workload the lab must contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedWorkload {
    pub kind: &'static str,
    pub namespace: &'static str,
    pub name: &'static str,
}

const fn expected(kind: &'static str, namespace: &'static str, name: &'static str) -> ExpectedWorkload {
    ExpectedWorkload { kind, namespace, name }
}

/// Workloads installed by the lab manifests
pub const EXPECTED_WORKLOADS: &[ExpectedWorkload] = &[
    expected("Deployment", "kube-system", "coredns"),
    expected("Deployment", "kube-system", "metrics-server"),
    expected("Deployment", "kube-system", "local-path-provisioner"),
    expected("Deployment", "monitoring", "prometheus-operator"),
    expected("Deployment", "monitoring", "prometheus-adapter"),
    expected("Deployment", "monitoring", "kube-state-metrics"),
    expected("Deployment", "monitoring", "blackbox-exporter"),
    expected("Deployment", "monitoring", "grafana"),
    expected("StatefulSet", "monitoring", "prometheus-k8s"),
    expected("StatefulSet", "monitoring", "alertmanager-main"),
    expected("DaemonSet", "monitoring", "node-exporter"),
    expected("Deployment", "longhorn-system", "longhorn-ui"),
    expected("Deployment", "longhorn-system", "longhorn-driver-deployer"),
    expected("Deployment", "longhorn-system", "csi-attacher"),
    expected("Deployment", "longhorn-system", "csi-provisioner"),
    expected("Deployment", "longhorn-system", "csi-snapshotter"),
    expected("Deployment", "longhorn-system", "csi-resizer"),
    expected("DaemonSet", "longhorn-system", "longhorn-manager"),
    expected("DaemonSet", "longhorn-system", "longhorn-csi-plugin"),
    expected("Deployment", "ingress-nginx", "ingress-nginx-controller"),
    expected("StatefulSet", "arma3", "arma3"),
    expected("StatefulSet", "arma3", "arma3-headless-client"),
    expected("StatefulSet", "teamspeak", "teamspeak"),
];

/// Everything the checks look at, listed across all namespaces
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub nodes: Vec<Node>,
    pub pods: Vec<Pod>,
    pub deployments: Vec<Deployment>,
    pub stateful_sets: Vec<StatefulSet>,
    pub daemon_sets: Vec<DaemonSet>,
    pub claims: Vec<PersistentVolumeClaim>,
}

impl Inventory {
    fn contains(&self, workload: &ExpectedWorkload) -> bool {
        let matches = |namespace: Option<&String>, name: Option<&String>| {
            namespace.map(String::as_str) == Some(workload.namespace)
                && name.map(String::as_str) == Some(workload.name)
        };
        match workload.kind {
            "Deployment" => self
                .deployments
                .iter()
                .any(|d| matches(d.metadata.namespace.as_ref(), d.metadata.name.as_ref())),
            "StatefulSet" => self
                .stateful_sets
                .iter()
                .any(|s| matches(s.metadata.namespace.as_ref(), s.metadata.name.as_ref())),
            "DaemonSet" => self
                .daemon_sets
                .iter()
                .any(|d| matches(d.metadata.namespace.as_ref(), d.metadata.name.as_ref())),
            _ => false,
        }
    }
}

/// Takes a snapshot of the cluster for verification
#[async_trait]
pub trait ClusterInventory: Send + Sync {
    async fn inventory(&self) -> Result<Inventory>;
}

/// Inventory listed through the Kubernetes API
pub struct KubeInventory {
    client: Client,
}

impl KubeInventory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_context(context: &LabContext) -> Self {
        Self::new(context.client().clone())
    }
}

#[async_trait]
impl ClusterInventory for KubeInventory {
    async fn inventory(&self) -> Result<Inventory> {
        let params = ListParams::default();
        let client = &self.client;

        Ok(Inventory {
            nodes: Api::<Node>::all(client.clone()).list(&params).await?.items,
            pods: Api::<Pod>::all(client.clone()).list(&params).await?.items,
            deployments: Api::<Deployment>::all(client.clone()).list(&params).await?.items,
            stateful_sets: Api::<StatefulSet>::all(client.clone()).list(&params).await?.items,
            daemon_sets: Api::<DaemonSet>::all(client.clone()).list(&params).await?.items,
            claims: Api::<PersistentVolumeClaim>::all(client.clone())
                .list(&params)
                .await?
                .items,
        })
    }
}

/// Health of a single resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHealth {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub healthy: bool,
    pub message: String,
}

impl ResourceHealth {
    fn new(kind: &str, name: Option<&String>, namespace: Option<&String>) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.cloned().unwrap_or_default(),
            namespace: namespace.cloned(),
            healthy: true,
            message: String::new(),
        }
    }

    pub fn identity(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{} {} in Namespace {}", self.kind, self.name, namespace),
            None => format!("{} {}", self.kind, self.name),
        }
    }

    fn ready(mut self) -> Self {
        self.message = format!("{} is Ready", self.identity());
        self
    }

    fn not_ready(mut self, reason: impl AsRef<str>) -> Self {
        self.healthy = false;
        self.message = format!("{} is not Ready: {}", self.identity(), reason.as_ref());
        self
    }
}

pub fn node_health(node: &Node) -> ResourceHealth {
    let health = ResourceHealth::new("Node", node.metadata.name.as_ref(), None);
    let not_ready = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .into_iter()
        .flatten()
        .find(|c| c.type_ == "Ready" && c.status != "True");

    match not_ready {
        Some(condition) => health.not_ready(format!("Ready is {}", condition.status)),
        None => health.ready(),
    }
}

/// A Pod is ready when its `Ready` condition is true, or when it completed
pub fn pod_health(pod: &Pod) -> ResourceHealth {
    let health = ResourceHealth::new("Pod", pod.metadata.name.as_ref(), pod.metadata.namespace.as_ref());
    let Some(status) = pod.status.as_ref() else {
        return health.not_ready("status is nil");
    };
    let Some(conditions) = status.conditions.as_ref() else {
        return health.not_ready("status.conditions is nil");
    };

    let blocked = conditions.iter().any(|c| {
        c.type_ == "Ready" && c.status != "True" && c.reason.as_deref() != Some("PodCompleted")
    });
    if !blocked {
        return health.ready();
    }

    let mut details = vec![format!("phase={}", status.phase.as_deref().unwrap_or("Unknown"))];
    details.extend(status.message.clone());
    details.extend(status.reason.clone());
    for container in status.container_statuses.iter().flatten().filter(|c| !c.ready) {
        let Some(state) = container.state.as_ref() else {
            continue;
        };
        if let Some(waiting) = &state.waiting {
            details.extend(waiting.reason.iter().map(|r| format!("{} waiting: {}", container.name, r)));
            details.extend(waiting.message.clone());
        }
        if let Some(terminated) = &state.terminated {
            details.extend(terminated.reason.iter().map(|r| format!("{} terminated: {}", container.name, r)));
            details.extend(terminated.message.clone());
        }
    }
    health.not_ready(details.join(" "))
}

pub fn deployment_health(deployment: &Deployment) -> ResourceHealth {
    let health = ResourceHealth::new(
        "Deployment",
        deployment.metadata.name.as_ref(),
        deployment.metadata.namespace.as_ref(),
    );
    let Some(conditions) = deployment.status.as_ref().and_then(|s| s.conditions.as_ref()) else {
        return health.not_ready("status.conditions is nil");
    };

    let failing = conditions
        .iter()
        .find(|c| (c.type_ == "Ready" || c.type_ == "Available") && c.status != "True");
    match failing {
        Some(condition) => {
            let mut reason = format!("{} is {}", condition.type_, condition.status);
            for detail in [&condition.reason, &condition.message].into_iter().flatten() {
                reason.push_str(": ");
                reason.push_str(detail);
            }
            health.not_ready(reason)
        }
        None => health.ready(),
    }
}

/// Ready when at least one replica is ready
pub fn stateful_set_health(stateful_set: &StatefulSet) -> ResourceHealth {
    let health = ResourceHealth::new(
        "StatefulSet",
        stateful_set.metadata.name.as_ref(),
        stateful_set.metadata.namespace.as_ref(),
    );
    match stateful_set.status.as_ref().and_then(|s| s.ready_replicas) {
        None => health.not_ready("status.readyReplicas is nil"),
        Some(0) => health.not_ready("0 replicas ready"),
        Some(_) => health.ready(),
    }
}

/// Ready when every desired Pod is scheduled and ready
pub fn daemon_set_health(daemon_set: &DaemonSet) -> ResourceHealth {
    let health = ResourceHealth::new(
        "DaemonSet",
        daemon_set.metadata.name.as_ref(),
        daemon_set.metadata.namespace.as_ref(),
    );
    let Some(status) = daemon_set.status.as_ref() else {
        return health.not_ready("status is nil");
    };

    let desired = status.desired_number_scheduled;
    if status.current_number_scheduled < desired {
        health.not_ready(format!("{}/{} scheduled", status.current_number_scheduled, desired))
    } else if status.number_ready < desired {
        health.not_ready(format!("{}/{} ready", status.number_ready, desired))
    } else {
        health.ready()
    }
}

pub fn claim_health(claim: &PersistentVolumeClaim) -> ResourceHealth {
    let health = ResourceHealth::new(
        "PersistentVolumeClaim",
        claim.metadata.name.as_ref(),
        claim.metadata.namespace.as_ref(),
    );
    match claim.status.as_ref().and_then(|s| s.phase.as_deref()) {
        Some("Bound") => health.ready(),
        phase => health.not_ready(format!("not bound, phase={}", phase.unwrap_or("Unknown"))),
    }
}

/// Outcome of a verification run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub resources: Vec<ResourceHealth>,
}

impl HealthReport {
    /// Run every check over `inventory`
    pub fn assess(inventory: &Inventory, expected: &[ExpectedWorkload]) -> Self {
        let mut resources: Vec<ResourceHealth> = Vec::new();
        resources.extend(inventory.nodes.iter().map(node_health));
        resources.extend(inventory.pods.iter().map(pod_health));
        resources.extend(inventory.deployments.iter().map(deployment_health));
        resources.extend(inventory.stateful_sets.iter().map(stateful_set_health));
        resources.extend(inventory.daemon_sets.iter().map(daemon_set_health));
        resources.extend(inventory.claims.iter().map(claim_health));

        for pod in &inventory.pods {
            let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
            if UNUSED_NAMESPACES.contains(&namespace) {
                let mut health =
                    ResourceHealth::new("Pod", pod.metadata.name.as_ref(), pod.metadata.namespace.as_ref());
                health.healthy = false;
                health.message = format!("{} runs in an unused Namespace", health.identity());
                resources.push(health);
            }
        }

        for workload in expected.iter().filter(|w| !inventory.contains(w)) {
            let name = workload.name.to_string();
            let namespace = workload.namespace.to_string();
            let mut health = ResourceHealth::new(workload.kind, Some(&name), Some(&namespace));
            health.healthy = false;
            health.message = format!("{} not found", health.identity());
            resources.push(health);
        }

        Self { resources }
    }

    pub fn is_healthy(&self) -> bool {
        self.resources.iter().all(|r| r.healthy)
    }

    pub fn unhealthy(&self) -> Vec<&ResourceHealth> {
        self.resources.iter().filter(|r| !r.healthy).collect()
    }

    pub fn summary(&self) -> String {
        if self.is_healthy() {
            format!("Healthy: {} resources ready", self.resources.len())
        } else {
            format!(
                "Unhealthy: {} of {} checks failed",
                self.unhealthy().len(),
                self.resources.len()
            )
        }
    }
}

/// Verifies cluster readiness over a [`ClusterInventory`]
pub struct Verifier<'a, I: ClusterInventory + ?Sized> {
    inventory: &'a I,
    reporter: &'a ProgressReporter,
    expected: &'a [ExpectedWorkload],
}

impl<'a, I: ClusterInventory + ?Sized> Verifier<'a, I> {
    pub fn new(inventory: &'a I, reporter: &'a ProgressReporter) -> Self {
        Self {
            inventory,
            reporter,
            expected: EXPECTED_WORKLOADS,
        }
    }

    pub fn with_expected(mut self, expected: &'a [ExpectedWorkload]) -> Self {
        self.expected = expected;
        self
    }

    /// Check the cluster once. Listing failures are errors; unhealthy
    /// resources are reported and returned in the report.
    pub async fn verify(&self) -> Result<HealthReport> {
        self.reporter.step("Verifying cluster readiness...");
        let inventory = self.inventory.inventory().await?;
        let report = HealthReport::assess(&inventory, self.expected);

        for resource in report.unhealthy() {
            self.reporter.failure(&resource.message);
        }
        if report.is_healthy() {
            self.reporter.success(&report.summary());
        } else {
            self.reporter.warn(&report.summary());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;
    use serde_json::json;

    fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    fn node(name: &str, ready: &str) -> Node {
        from_json(json!({
            "metadata": { "name": name },
            "status": { "conditions": [
                { "type": "MemoryPressure", "status": "False" },
                { "type": "Ready", "status": ready }
            ]}
        }))
    }

    fn pod(namespace: &str, name: &str, ready: &str, reason: Option<&str>) -> Pod {
        let mut condition = json!({ "type": "Ready", "status": ready });
        if let Some(reason) = reason {
            condition["reason"] = json!(reason);
        }
        from_json(json!({
            "metadata": { "name": name, "namespace": namespace },
            "status": {
                "phase": "Running",
                "conditions": [condition],
                "containerStatuses": [{
                    "name": "arma3",
                    "image": "arma3:latest",
                    "imageID": "",
                    "ready": ready == "True",
                    "restartCount": 3,
                    "state": { "waiting": { "reason": "CrashLoopBackOff" } }
                }]
            }
        }))
    }

    fn stateful_set(namespace: &str, name: &str, ready_replicas: Option<i32>) -> StatefulSet {
        let mut status = json!({ "replicas": 1 });
        if let Some(ready) = ready_replicas {
            status["readyReplicas"] = json!(ready);
        }
        from_json(json!({
            "metadata": { "name": name, "namespace": namespace },
            "status": status
        }))
    }

    #[test]
    fn test_node_health() {
        assert!(node_health(&node("node-1", "True")).healthy);

        let health = node_health(&node("node-2", "Unknown"));
        assert!(!health.healthy);
        assert_eq!(health.message, "Node node-2 is not Ready: Ready is Unknown");
    }

    #[test]
    fn test_pod_health() {
        assert!(pod_health(&pod("arma3", "arma3-0", "True", None)).healthy);
        assert!(pod_health(&pod("kube-system", "helm-install", "False", Some("PodCompleted"))).healthy);

        let health = pod_health(&pod("arma3", "arma3-0", "False", Some("ContainersNotReady")));
        assert!(!health.healthy);
        assert!(health.message.starts_with("Pod arma3-0 in Namespace arma3 is not Ready: phase=Running"));
        assert!(health.message.contains("arma3 waiting: CrashLoopBackOff"));

        let no_status: Pod = from_json(json!({ "metadata": { "name": "p", "namespace": "x" } }));
        assert!(pod_health(&no_status).message.ends_with("status is nil"));
    }

    #[test]
    fn test_deployment_health() {
        let available: Deployment = from_json(json!({
            "metadata": { "name": "grafana", "namespace": "monitoring" },
            "status": { "conditions": [
                { "type": "Progressing", "status": "True" },
                { "type": "Available", "status": "True" }
            ]}
        }));
        assert!(deployment_health(&available).healthy);

        let unavailable: Deployment = from_json(json!({
            "metadata": { "name": "grafana", "namespace": "monitoring" },
            "status": { "conditions": [{
                "type": "Available",
                "status": "False",
                "reason": "MinimumReplicasUnavailable",
                "message": "Deployment does not have minimum availability."
            }]}
        }));
        assert_eq!(
            deployment_health(&unavailable).message,
            "Deployment grafana in Namespace monitoring is not Ready: Available is False: MinimumReplicasUnavailable: Deployment does not have minimum availability."
        );

        let fresh: Deployment = from_json(json!({
            "metadata": { "name": "grafana", "namespace": "monitoring" }
        }));
        assert!(!deployment_health(&fresh).healthy);
    }

    #[test]
    fn test_stateful_set_health() {
        assert!(stateful_set_health(&stateful_set("arma3", "arma3", Some(1))).healthy);
        assert!(!stateful_set_health(&stateful_set("arma3", "arma3", Some(0))).healthy);
        assert!(!stateful_set_health(&stateful_set("arma3", "arma3", None)).healthy);
    }

    #[test]
    fn test_daemon_set_health() {
        let daemon_set = |scheduled: i32, ready: i32| -> DaemonSet {
            from_json(json!({
                "metadata": { "name": "node-exporter", "namespace": "monitoring" },
                "status": {
                    "currentNumberScheduled": scheduled,
                    "desiredNumberScheduled": 3,
                    "numberMisscheduled": 0,
                    "numberReady": ready
                }
            }))
        };

        assert!(daemon_set_health(&daemon_set(3, 3)).healthy);
        assert!(daemon_set_health(&daemon_set(2, 2)).message.ends_with("2/3 scheduled"));
        assert!(daemon_set_health(&daemon_set(3, 1)).message.ends_with("1/3 ready"));
    }

    #[test]
    fn test_claim_health() {
        let claim = |phase: &str| -> PersistentVolumeClaim {
            from_json(json!({
                "metadata": { "name": "arma3-data", "namespace": "arma3" },
                "status": { "phase": phase }
            }))
        };

        assert!(claim_health(&claim("Bound")).healthy);
        assert_eq!(
            claim_health(&claim("Pending")).message,
            "PersistentVolumeClaim arma3-data in Namespace arma3 is not Ready: not bound, phase=Pending"
        );
    }

    #[test]
    fn test_pods_in_unused_namespaces() {
        let inventory = Inventory {
            pods: vec![
                pod("default", "stray", "True", None),
                pod("arma3", "arma3-0", "True", None),
            ],
            ..Default::default()
        };

        let report = HealthReport::assess(&inventory, &[]);
        let unhealthy = report.unhealthy();
        assert_eq!(unhealthy.len(), 1);
        assert_eq!(unhealthy[0].message, "Pod stray in Namespace default runs in an unused Namespace");
    }

    #[test]
    fn test_missing_expected_workloads() {
        let expected = [
            expected("StatefulSet", "arma3", "arma3"),
            expected("StatefulSet", "teamspeak", "teamspeak"),
        ];
        let inventory = Inventory {
            stateful_sets: vec![stateful_set("arma3", "arma3", Some(1))],
            ..Default::default()
        };

        let report = HealthReport::assess(&inventory, &expected);
        assert_eq!(report.summary(), "Unhealthy: 1 of 2 checks failed");
        assert_eq!(
            report.unhealthy()[0].message,
            "StatefulSet teamspeak in Namespace teamspeak not found"
        );
    }

    #[tokio::test]
    async fn test_verify_reports_failures() {
        let cluster = MockCluster::new();
        cluster.set_inventory(Inventory {
            nodes: vec![node("node-1", "True"), node("node-2", "False")],
            stateful_sets: vec![stateful_set("arma3", "arma3", Some(1))],
            ..Default::default()
        });
        let reporter = ProgressReporter::captured();

        let report = Verifier::new(&cluster, &reporter)
            .with_expected(&[])
            .verify()
            .await
            .unwrap();

        assert!(!report.is_healthy());
        assert_eq!(
            reporter.lines(),
            vec![
                "Verifying cluster readiness...",
                "Node node-2 is not Ready: Ready is False",
                "Unhealthy: 1 of 3 checks failed",
            ]
        );
        assert_eq!(cluster.counts().inventories, 1);
    }

    #[tokio::test]
    async fn test_verify_healthy_cluster() {
        let cluster = MockCluster::new();
        cluster.set_inventory(Inventory {
            nodes: vec![node("node-1", "True")],
            stateful_sets: vec![
                stateful_set("arma3", "arma3", Some(1)),
                stateful_set("arma3", "arma3-headless-client", Some(1)),
            ],
            ..Default::default()
        });
        let reporter = ProgressReporter::captured();
        let expected = [
            expected("StatefulSet", "arma3", "arma3"),
            expected("StatefulSet", "arma3", "arma3-headless-client"),
        ];

        let report = Verifier::new(&cluster, &reporter)
            .with_expected(&expected)
            .verify()
            .await
            .unwrap();

        assert!(report.is_healthy());
        assert_eq!(reporter.lines().last().unwrap(), "Healthy: 3 resources ready");
    }
}
