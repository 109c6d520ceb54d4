//! Gamelab Engine - from manifest files to customized documents
//!
//! This crate provides:
//! - `ManifestLoader`: collects manifest files, renders them and parses documents
//! - `Renderer`: MiniJinja rendering against the lab configuration
//! - `Customizer`: pure rewrite rules injecting lab-wide policy into documents

pub mod customize;
pub mod error;
pub mod loader;
pub mod render;

pub use customize::{Change, Customized, Customizer, Rewrite};
pub use error::{EngineError, Result, TemplateError};
pub use loader::{ManifestLoader, parse_documents};
pub use render::Renderer;
