//! Lab configuration
//!
//! The lab is configured with a single JSON file:
//!
//! ```json
//! {
//!   "nginx": { "base_url": "https://lab.example.com" },
//!   "cert_manager": { "issuer": "letsencrypt-production" },
//!   "arma3": {
//!     "hostname": "Example Arma Server",
//!     "admin_password": "someadminpassword",
//!     "server_password": "someserverpassword",
//!     "server_command_password": "somecommandpassword",
//!     "steamcmd": { "username": "exampleuser", "password": "examplepassword" },
//!     "mods": [{ "name": "cba_a3", "workshop_id": 450814997 }]
//!   }
//! }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use url::Url;

use crate::error::{CoreError, Result};

static MOD_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());

/// Top level configuration object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabConfig {
    pub nginx: Nginx,

    #[serde(default)]
    pub cert_manager: CertManager,

    pub arma3: Arma3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nginx {
    /// Base URL under which path-based ingresses are served
    pub base_url: Url,

    /// IngressClass handled by the ingress controller
    #[serde(default = "default_ingress_class")]
    pub ingress_class: String,
}

fn default_ingress_class() -> String {
    "nginx".to_string()
}

impl Nginx {
    /// Host part of the base URL. Validation guarantees it is present.
    pub fn base_host(&self) -> &str {
        self.base_url.host_str().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertManager {
    #[serde(default)]
    pub issuer: Issuer,
}

/// cert-manager ClusterIssuer used for ingress certificates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Issuer {
    #[default]
    #[serde(rename = "letsencrypt-staging")]
    LetsEncryptStaging,

    #[serde(rename = "letsencrypt-production")]
    LetsEncryptProduction,
}

impl Issuer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Issuer::LetsEncryptStaging => "letsencrypt-staging",
            Issuer::LetsEncryptProduction => "letsencrypt-production",
        }
    }
}

impl fmt::Display for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arma3 {
    /// Name of the server displayed in the server browser
    pub hostname: String,

    /// Password required for a player to use admin commands
    pub admin_password: Secret,

    /// Password required for a player to join the server
    pub server_password: Secret,

    /// Password required for a player to use server commands
    pub server_command_password: Secret,

    pub steamcmd: SteamCmd,

    /// Workshop mods, installed and loaded in this order
    #[serde(default)]
    pub mods: Vec<ModSpec>,
}

/// Steam account used to download workshop content.
///
/// Steam Guard must be disabled on this account for unattended downloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteamCmd {
    pub username: String,
    pub password: Secret,
}

/// A Steam workshop mod
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModSpec {
    /// snake_case name, used for the `@name` mod directory
    pub name: String,
    pub workshop_id: u64,
}

/// A secret string value.
///
/// `Debug` and `Display` are redacted. Serialization emits the plaintext
/// because manifests are rendered from the serialized configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(**********)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("**********")
    }
}

impl LabConfig {
    /// Load and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate a configuration from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let config: LabConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the rest of the lab relies on
    pub fn validate(&self) -> Result<()> {
        match self.nginx.base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(CoreError::invalid_config(
                    "nginx.base_url",
                    format!("unsupported scheme '{}', expected http or https", other),
                ));
            }
        }
        if self.nginx.base_url.host_str().is_none_or(str::is_empty) {
            return Err(CoreError::invalid_config("nginx.base_url", "URL has no host"));
        }
        if self.nginx.ingress_class.trim().is_empty() {
            return Err(CoreError::invalid_config(
                "nginx.ingress_class",
                "must not be empty",
            ));
        }

        let mut names = HashSet::new();
        let mut workshop_ids = HashSet::new();
        for (index, spec) in self.arma3.mods.iter().enumerate() {
            let field = format!("arma3.mods[{}]", index);
            if !MOD_NAME.is_match(&spec.name) {
                return Err(CoreError::invalid_config(
                    format!("{}.name", field),
                    format!("'{}' is not a snake_case identifier", spec.name),
                ));
            }
            if spec.workshop_id == 0 {
                return Err(CoreError::invalid_config(
                    format!("{}.workshop_id", field),
                    "must be a positive integer",
                ));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(CoreError::invalid_config(
                    format!("{}.name", field),
                    format!("duplicate mod name '{}'", spec.name),
                ));
            }
            if !workshop_ids.insert(spec.workshop_id) {
                return Err(CoreError::invalid_config(
                    format!("{}.workshop_id", field),
                    format!("duplicate workshop id {}", spec.workshop_id),
                ));
            }
        }

        Ok(())
    }

    /// Context exposed to manifest templates, with plaintext secrets
    pub fn template_context(&self) -> Result<JsonValue> {
        let mut context = serde_json::to_value(self)?;
        if let Some(map) = context.as_object_mut() {
            map.insert(
                "base_host".to_string(),
                JsonValue::String(self.nginx.base_host().to_string()),
            );
        }
        Ok(context)
    }
}
