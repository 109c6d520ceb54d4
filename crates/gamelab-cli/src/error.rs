//! CLI error type and its mapping to exit codes

use gamelab_core::CoreError;
use gamelab_engine::{EngineError, TemplateError};
use gamelab_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// The lab configuration is missing or invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(gamelab::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    /// A manifest could not be found or parsed
    #[error("Manifest error: {message}")]
    #[diagnostic(code(gamelab::cli::manifest))]
    Manifest {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The cluster rejected or never completed an operation
    #[error("{message}")]
    #[diagnostic(code(gamelab::cli::cluster))]
    Cluster {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("IO error: {message}")]
    #[diagnostic(code(gamelab::cli::io))]
    Io { message: String },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Template(_) | CliError::Manifest { .. } => exit_codes::MANIFEST_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
        }
    }

    fn config(message: impl Into<String>, help: Option<&str>) -> Self {
        Self::Config {
            message: message.into(),
            help: help.map(str::to_string),
        }
    }

    fn manifest(message: impl Into<String>, help: Option<&str>) -> Self {
        Self::Manifest {
            message: message.into(),
            help: help.map(str::to_string),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConfigNotFound { .. } => CliError::config(
                err.to_string(),
                Some("pass --config or set LABCONFIG to the lab configuration file"),
            ),
            CoreError::InvalidConfig { .. } | CoreError::JsonParse(_) => {
                CliError::config(err.to_string(), None)
            }
            CoreError::InvalidDocument { .. } => CliError::manifest(err.to_string(), None),
            CoreError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Template(e) => CliError::Template(e),
            EngineError::PathNotFound { .. } => CliError::manifest(
                err.to_string(),
                Some("each -m/--manifest must name an existing file or directory"),
            ),
            EngineError::Parse { .. } | EngineError::InvalidDocument { .. } => {
                CliError::manifest(err.to_string(), None)
            }
            EngineError::Core(e) => e.into(),
            EngineError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Config(_) => CliError::Cluster {
                message: err.to_string(),
                help: Some("pass --kubeconfig or set KUBECONFIG".to_string()),
            },
            other => CliError::Cluster {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Render reports without wrapping, so messages reach stderr verbatim
pub fn install_report_hook() {
    let _ = miette::set_hook(Box::new(|_| {
        Box::new(miette::MietteHandlerOpts::new().wrap_lines(false).build())
    }));
}
