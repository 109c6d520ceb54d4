//! Manifest loading: collect files, render, parse and flatten

use std::path::{Path, PathBuf};

use gamelab_core::{Document, LabConfig};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::error::{EngineError, Result};
use crate::render::Renderer;

/// File extensions picked up when walking a manifest directory
const MANIFEST_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Loads manifest files into documents
pub struct ManifestLoader {
    renderer: Renderer,
}

impl ManifestLoader {
    pub fn new(config: &LabConfig) -> Result<Self> {
        Ok(Self {
            renderer: Renderer::new(config)?,
        })
    }

    /// Expand the given paths into the list of manifest files.
    ///
    /// Files are taken as-is. Directories are walked recursively in file
    /// name order and only YAML/JSON files are kept.
    pub fn collect_files(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for path in paths {
            if path.is_dir() {
                for entry in WalkDir::new(path).sort_by_file_name() {
                    let entry = entry.map_err(|e| EngineError::Io(e.into()))?;
                    if entry.file_type().is_file() && has_manifest_extension(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
            } else if path.is_file() {
                files.push(path.clone());
            } else {
                return Err(EngineError::PathNotFound {
                    path: path.display().to_string(),
                });
            }
        }

        Ok(files)
    }

    /// Render and parse one manifest file
    pub fn load_file(&self, path: &Path) -> Result<Vec<Document>> {
        let source = std::fs::read_to_string(path)?;
        let rendered = self.renderer.render(&path.display().to_string(), &source)?;
        parse_documents(&rendered, path)
    }
}

/// Parse multi-document YAML (or JSON) into flattened documents.
///
/// Empty documents are skipped and `*List` kinds are unwrapped.
pub fn parse_documents(source: &str, origin: &Path) -> Result<Vec<Document>> {
    let mut documents = Vec::new();

    for deserializer in serde_yaml::Deserializer::from_str(source) {
        let value = serde_json::Value::deserialize(deserializer).map_err(|e| EngineError::Parse {
            path: origin.display().to_string(),
            message: e.to_string(),
        })?;
        if value.is_null() {
            continue;
        }

        let flattened = Document::flatten(value).map_err(|source| EngineError::InvalidDocument {
            path: origin.display().to_string(),
            source,
        })?;
        documents.extend(flattened);
    }

    Ok(documents)
}

fn has_manifest_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext))
}
