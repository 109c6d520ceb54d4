//! Engine error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template error")]
    Template(#[from] TemplateError),

    #[error("Manifest path not found: {path}")]
    PathNotFound { path: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid document in {path}: {source}")]
    InvalidDocument {
        path: String,
        #[source]
        source: gamelab_core::CoreError,
    },

    #[error(transparent)]
    Core(#[from] gamelab_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Template rendering error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(gamelab::template::render))]
pub struct TemplateError {
    pub message: String,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,
}

impl TemplateError {
    /// Create a new template error from a MiniJinja error
    pub fn from_minijinja(err: minijinja::Error, template_name: &str, template_source: &str) -> Self {
        let span = err
            .line()
            .and_then(|line_num| calculate_span(template_source, line_num));

        Self {
            message: format!("{:#}", err),
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
        }
    }
}

fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;

    for (index, line) in source.lines().enumerate() {
        if index + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }

    None
}

pub type Result<T> = std::result::Result<T, EngineError>;
