//! Pod discovery and remote command execution

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    Client,
    api::{Api, AttachParams, ListParams},
};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::context::LabContext;
use crate::error::{KubeError, Result};

/// A running Pod commands can be executed in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPod {
    pub name: String,
    pub namespace: String,
    pub containers: BTreeSet<String>,
}

impl TargetPod {
    pub fn has_container(&self, container: &str) -> bool {
        self.containers.contains(container)
    }

    fn from_pod(pod: Pod) -> Self {
        let containers = pod
            .spec
            .map(|spec| spec.containers.into_iter().map(|c| c.name).collect())
            .unwrap_or_default();
        Self {
            name: pod.metadata.name.unwrap_or_default(),
            namespace: pod.metadata.namespace.unwrap_or_default(),
            containers,
        }
    }
}

/// A command to run inside a container.
///
/// `Debug` hides the arguments, which may carry credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    argv: Vec<String>,
    tty: bool,
}

impl RemoteCommand {
    /// Run `script` with `bash -c`
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            argv: vec!["bash".to_string(), "-c".to_string(), script.into()],
            tty: false,
        }
    }

    /// Allocate a TTY. stderr is merged into stdout.
    pub fn with_tty(mut self) -> Self {
        self.tty = true;
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn tty(&self) -> bool {
        self.tty
    }

    /// The script of a shell command
    pub fn script(&self) -> &str {
        self.argv.last().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Debug for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCommand")
            .field("program", &self.argv.first())
            .field("args", &format_args!("[redacted]"))
            .field("tty", &self.tty)
            .finish()
    }
}

/// Output of a remote command. stderr, when captured separately, is
/// appended to `stdout`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub succeeded: bool,
}

/// Finds Pods and runs commands in their containers
#[async_trait]
pub trait PodRuntime: Send + Sync {
    /// Running Pods matching a label selector, sorted by name
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<TargetPod>>;

    /// Run a command to completion. A command that runs and exits non-zero
    /// is `Ok` with `succeeded == false`; transport failures are
    /// [`KubeError::Exec`].
    async fn exec(
        &self,
        pod: &TargetPod,
        container: &str,
        command: &RemoteCommand,
    ) -> Result<CommandResult>;
}

/// Pod runtime backed by the Kubernetes API and the exec subresource
pub struct KubePodRuntime {
    client: Client,
}

impl KubePodRuntime {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_context(context: &LabContext) -> Self {
        Self::new(context.client().clone())
    }
}

#[async_trait]
impl PodRuntime for KubePodRuntime {
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<TargetPod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(selector)).await?;

        let mut running: Vec<TargetPod> = pods
            .items
            .into_iter()
            .filter(|pod| {
                pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running")
            })
            .map(TargetPod::from_pod)
            .collect();
        running.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::debug!(namespace, selector, count = running.len(), "listed running pods");
        Ok(running)
    }

    async fn exec(
        &self,
        pod: &TargetPod,
        container: &str,
        command: &RemoteCommand,
    ) -> Result<CommandResult> {
        let exec_error = |message: String| KubeError::Exec {
            pod: pod.name.clone(),
            container: container.to_string(),
            message,
        };

        let api: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(!command.tty())
            .tty(command.tty());

        tracing::debug!(pod = %pod.name, container, ?command, "exec");
        let mut process = api
            .exec(&pod.name, command.argv().to_vec(), &params)
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        let stdout = process.stdout();
        let stderr = process.stderr();
        let status = process.take_status();

        let (stdout, stderr) = tokio::join!(read_all(stdout), read_all(stderr));
        let mut output = stdout.map_err(|e| exec_error(e.to_string()))?;
        let stderr = stderr.map_err(|e| exec_error(e.to_string()))?;
        if !stderr.is_empty() {
            output.push_str(&stderr);
        }

        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        process
            .join()
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        let succeeded = status.as_ref().and_then(|s| s.status.as_deref()) == Some("Success");
        Ok(CommandResult {
            stdout: output,
            succeeded,
        })
    }
}

async fn read_all(reader: Option<impl AsyncRead + Unpin>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Quote a string for POSIX shells
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
