//! Cluster-wide policy injected into manifests before they are applied
//!
//! Each rule is a pure function from a document to a rewritten document plus
//! a list of change notes. Rules run in a fixed order and are idempotent, so
//! customizing an already customized manifest set is a no-op.

use std::fmt;

use gamelab_core::{Document, LabConfig};
use serde_json::{Value, json};

/// Namespace of the game servers
pub const GAME_NAMESPACE: &str = "arma3";

/// StatefulSets running an Arma 3 server process
pub const GAME_SERVER_NAMES: [&str; 2] = ["arma3", "arma3-headless-client"];

/// Container running `arma3server`
pub const GAME_CONTAINER: &str = "arma3";

const PULL_POLICY: &str = "IfNotPresent";
const ISSUER_ANNOTATION: &str = "cert-manager.io/cluster-issuer";

type Rule = fn(&Document, &LabConfig) -> Rewrite;

const RULES: [Rule; 3] = [pull_policy, ingress_tls, mod_arguments];

/// Output of a single rule
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub document: Document,
    pub notes: Vec<String>,
}

impl Rewrite {
    fn unchanged(document: &Document) -> Self {
        Self {
            document: document.clone(),
            notes: Vec::new(),
        }
    }
}

/// A change made to a document, reported to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub identity: String,
    pub description: String,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Customizing {}: {}", self.identity, self.description)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Customized {
    pub documents: Vec<Document>,
    pub changes: Vec<Change>,
}

pub struct Customizer<'a> {
    config: &'a LabConfig,
}

impl<'a> Customizer<'a> {
    pub fn new(config: &'a LabConfig) -> Self {
        Self { config }
    }

    /// Run every rule over every document, preserving document order
    pub fn customize(&self, documents: &[Document]) -> Customized {
        let mut customized = Customized::default();

        for original in documents {
            let mut current = original.clone();
            for rule in RULES {
                let Rewrite { document, notes } = rule(&current, self.config);
                customized
                    .changes
                    .extend(notes.into_iter().map(|description| Change {
                        identity: document.identity(),
                        description,
                    }));
                current = document;
            }
            customized.documents.push(current);
        }

        tracing::debug!(
            documents = customized.documents.len(),
            changes = customized.changes.len(),
            "customized manifests"
        );
        customized
    }
}

/// Every workload container pulls its image only when missing
fn pull_policy(document: &Document, _config: &LabConfig) -> Rewrite {
    let mut rewritten = document.clone();
    let mut notes = Vec::new();

    if let Some(containers) = pod_containers_mut(&mut rewritten) {
        for container in containers.iter_mut().filter_map(Value::as_object_mut) {
            if container.get("imagePullPolicy").and_then(Value::as_str) == Some(PULL_POLICY) {
                continue;
            }
            container.insert("imagePullPolicy".to_string(), json!(PULL_POLICY));
            let name = container
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>");
            notes.push(format!(
                "Setting image pull policy of container {} to {} to conserve network bandwidth",
                name, PULL_POLICY
            ));
        }
    }

    Rewrite {
        document: rewritten,
        notes,
    }
}

/// Ingresses are served by the configured class under the base host, with a
/// certificate issued by cert-manager
fn ingress_tls(document: &Document, config: &LabConfig) -> Rewrite {
    if document.kind() != "Ingress" {
        return Rewrite::unchanged(document);
    }

    let host = config.nginx.base_host();
    let issuer = config.cert_manager.issuer.as_str();
    let secret_name = format!("{}-ingress-tls", document.name());

    let mut rewritten = document.clone();
    rewritten
        .annotations_mut()
        .insert(ISSUER_ANNOTATION.to_string(), json!(issuer));

    let spec = rewritten.spec_entry();
    spec.insert(
        "ingressClassName".to_string(),
        json!(config.nginx.ingress_class),
    );
    spec.insert(
        "tls".to_string(),
        json!([{ "hosts": [host], "secretName": secret_name }]),
    );
    if let Some(rules) = spec.get_mut("rules").and_then(Value::as_array_mut) {
        for rule in rules.iter_mut().filter_map(Value::as_object_mut) {
            rule.insert("host".to_string(), json!(host));
        }
    }

    let notes = if rewritten == *document {
        Vec::new()
    } else {
        vec![format!("Configuring TLS using ClusterIssuer {}", issuer)]
    };
    Rewrite {
        document: rewritten,
        notes,
    }
}

/// Game servers load the configured workshop mods
fn mod_arguments(document: &Document, config: &LabConfig) -> Rewrite {
    let mods = &config.arma3.mods;
    let targeted = !mods.is_empty()
        && document.kind() == "StatefulSet"
        && document.namespace() == Some(GAME_NAMESPACE)
        && GAME_SERVER_NAMES.contains(&document.name());
    if !targeted {
        return Rewrite::unchanged(document);
    }

    let argument = format!(
        "-mod={}",
        mods.iter()
            .map(|spec| format!("@{}", spec.name))
            .collect::<Vec<_>>()
            .join(";")
    );

    let mut rewritten = document.clone();
    let mut changed = false;
    if let Some(containers) = pod_containers_mut(&mut rewritten) {
        for container in containers.iter_mut().filter_map(Value::as_object_mut) {
            if container.get("name").and_then(Value::as_str) != Some(GAME_CONTAINER) {
                continue;
            }
            let args = ensure_array(container.entry("args").or_insert(Value::Null));
            if !args.iter().any(|arg| arg.as_str() == Some(argument.as_str())) {
                args.push(json!(argument));
                changed = true;
            }
        }
    }

    let notes = if changed {
        vec!["Adding Arma 3 mods to arma3server arguments".to_string()]
    } else {
        Vec::new()
    };
    Rewrite {
        document: rewritten,
        notes,
    }
}

/// Containers of the pod template of a workload, if the document has one
fn pod_containers_mut(document: &mut Document) -> Option<&mut Vec<Value>> {
    let template_path: &[&str] = match document.kind() {
        "Deployment" | "StatefulSet" | "Job" => &["template"],
        "CronJob" => &["jobTemplate", "spec", "template"],
        _ => return None,
    };

    let mut node = document.spec_mut()?;
    for key in template_path {
        node = node.get_mut(*key)?.as_object_mut()?;
    }
    node.get_mut("spec")?
        .get_mut("containers")?
        .as_array_mut()
}

/// Turn `slot` into an array (replacing any other value) and borrow it
fn ensure_array(slot: &mut Value) -> &mut Vec<Value> {
    match slot {
        Value::Array(items) => items,
        other => {
            *other = Value::Array(Vec::new());
            ensure_array(other)
        }
    }
}
