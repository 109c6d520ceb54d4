//! Parsed Kubernetes manifest documents

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

/// One parsed Kubernetes manifest.
///
/// Always a JSON object with a non-empty `kind` and `metadata.name`. The
/// only mutable views handed out are `spec` and `metadata.annotations`, so
/// the identity fields cannot be broken after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Validate and wrap a parsed manifest
    pub fn new(value: Value) -> Result<Self> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(CoreError::InvalidDocument {
                    message: format!("expected a mapping, found {}", type_name(&other)),
                });
            }
        };

        let kind = map.get("kind").and_then(Value::as_str).unwrap_or_default();
        if kind.is_empty() {
            return Err(CoreError::InvalidDocument {
                message: "missing kind".to_string(),
            });
        }

        let name = map
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if name.is_empty() {
            return Err(CoreError::InvalidDocument {
                message: format!("{} is missing metadata.name", kind),
            });
        }

        Ok(Self(map))
    }

    /// Wrap a manifest, unwrapping `*List` kinds into their items
    pub fn flatten(value: Value) -> Result<Vec<Self>> {
        let is_list = value
            .get("kind")
            .and_then(Value::as_str)
            .is_some_and(|kind| kind.ends_with("List"));

        if !is_list {
            return Ok(vec![Self::new(value)?]);
        }

        match value.get("items") {
            Some(Value::Array(items)) => items
                .iter()
                .cloned()
                .map(Self::flatten)
                .collect::<Result<Vec<_>>>()
                .map(|nested| nested.into_iter().flatten().collect()),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(CoreError::InvalidDocument {
                message: format!("list items must be a sequence, found {}", type_name(other)),
            }),
        }
    }

    pub fn kind(&self) -> &str {
        self.0.get("kind").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn api_version(&self) -> Option<&str> {
        self.0.get("apiVersion").and_then(Value::as_str)
    }

    pub fn name(&self) -> &str {
        self.metadata()
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata()
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty())
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata()
            .and_then(|m| m.get("annotations"))
            .and_then(|a| a.get(key))
            .and_then(Value::as_str)
    }

    /// `Kind name`, followed by `in Namespace ns` for namespaced documents
    pub fn identity(&self) -> String {
        match self.namespace() {
            Some(namespace) => format!("{} {} in Namespace {}", self.kind(), self.name(), namespace),
            None => format!("{} {}", self.kind(), self.name()),
        }
    }

    pub fn spec(&self) -> Option<&Map<String, Value>> {
        self.0.get("spec").and_then(Value::as_object)
    }

    /// Mutable `spec`, if the document has one
    pub fn spec_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.0.get_mut("spec").and_then(Value::as_object_mut)
    }

    /// Mutable `spec`, created if missing
    pub fn spec_entry(&mut self) -> &mut Map<String, Value> {
        ensure_object(self.0.entry("spec").or_insert(Value::Null))
    }

    /// Mutable `metadata.annotations`, created if missing
    pub fn annotations_mut(&mut self) -> &mut Map<String, Value> {
        let metadata = ensure_object(self.0.entry("metadata").or_insert(Value::Null));
        ensure_object(metadata.entry("annotations").or_insert(Value::Null))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.0.get("metadata").and_then(Value::as_object)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

/// Turn `slot` into an object (replacing any other value) and borrow it
fn ensure_object(slot: &mut Value) -> &mut Map<String, Value> {
    match slot {
        Value::Object(map) => map,
        other => {
            *other = Value::Object(Map::new());
            ensure_object(other)
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
