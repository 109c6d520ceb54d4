//! Gamelab Kube - cluster side of the lab deployer
//!
//! This crate provides:
//! - `retry`: the bounded retry-with-backoff primitive
//! - `ApplyEngine` / `ServerSideApply`: applying batches of documents
//! - `ReadinessWaiter` / `KubeCrdLookup`: waiting for CRDs
//! - `Deployer`: ordered deployment of a manifest set
//! - `ModSync` / `KubePodRuntime`: Arma 3 mod sync inside running Pods
//! - `Verifier` / `KubeInventory`: post-deploy readiness checks
//! - `MockCluster`: an in-memory cluster for tests

pub mod apply;
pub mod context;
pub mod crd;
pub mod deploy;
pub mod error;
pub mod mock;
pub mod mods;
pub mod pods;
pub mod progress;
pub mod retry;
pub mod verify;

pub use apply::{ApplyEngine, ClusterApply, ServerSideApply};
pub use context::LabContext;
pub use crd::{CrdLookup, CrdPresence, KubeCrdLookup, ReadinessWaiter};
pub use deploy::{APPLY_GROUPS, Deployer};
pub use error::{KubeError, Result};
pub use mock::{ExecRecord, MockCluster, OperationCounts};
pub use mods::{ModSync, ModSyncOptions};
pub use pods::{CommandResult, KubePodRuntime, PodRuntime, RemoteCommand, TargetPod};
pub use progress::ProgressReporter;
pub use retry::{Backoff, RetryPolicy, StopCondition, retry};
pub use verify::{ClusterInventory, HealthReport, Inventory, KubeInventory, ResourceHealth, Verifier};
