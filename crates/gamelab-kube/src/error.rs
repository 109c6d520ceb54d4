//! Error types for gamelab-kube

use thiserror::Error;

/// Result type for gamelab-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during cluster operations
///
/// Errors fall in three classes, which drive the retry executor:
/// transient ones are retried, not-ready ones are polled, everything else
/// is fatal.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Could not build a client from the kubeconfig
    #[error("invalid cluster configuration: {0}")]
    Config(String),

    /// The apply primitive rejected a batch
    #[error("apply failed: {message}")]
    Apply { message: String },

    /// A resource the deployment depends on does not exist yet
    #[error("{resource} is not ready")]
    NotReady { resource: String },

    /// steamcmd did not report a successful download
    #[error("download of mod {name} ({workshop_id}) failed:\n{output}")]
    DownloadFailed {
        name: String,
        workshop_id: u64,
        output: String,
    },

    /// Steam throttled the download
    #[error("download of mod {name} ({workshop_id}) was rate limited")]
    RateLimited { name: String, workshop_id: u64 },

    /// The exec subresource could not run the command
    #[error("exec in container {container} of Pod {pod} failed: {message}")]
    Exec {
        pod: String,
        container: String,
        message: String,
    },

    /// A remote command ran and exited unsuccessfully
    #[error("{step} failed in Pod {pod}:\n{output}")]
    CommandFailed {
        pod: String,
        step: String,
        output: String,
    },

    /// A discovered Pod lacks a container the pipeline needs
    #[error("Pod {pod} has no container named {container}")]
    MissingContainer { pod: String, container: String },

    /// A retried operation ran out of attempts or time
    #[error("{operation} failed after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<KubeError>,
    },

    /// Timeout
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Failures worth another attempt after a backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KubeError::Apply { .. }
                | KubeError::DownloadFailed { .. }
                | KubeError::RateLimited { .. }
                | KubeError::Exec { .. }
        )
    }

    /// The awaited resource does not exist yet
    pub fn is_not_ready(&self) -> bool {
        matches!(self, KubeError::NotReady { .. })
    }

    pub fn is_retryable(&self) -> bool {
        self.is_transient() || self.is_not_ready()
    }

    /// The innermost error, looking through retry exhaustion
    pub fn root(&self) -> &KubeError {
        match self {
            KubeError::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}
