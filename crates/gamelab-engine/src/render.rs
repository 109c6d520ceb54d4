//! Manifest rendering based on MiniJinja

use gamelab_core::LabConfig;
use minijinja::{Environment, ErrorKind, UndefinedBehavior, Value};

use crate::error::{Result, TemplateError};

/// Renders manifest text against the lab configuration.
///
/// Configuration sections are exposed as top-level variables (`nginx`,
/// `cert_manager`, `arma3`) together with `base_host`. Secrets are rendered
/// in plaintext.
pub struct Renderer {
    context: Value,
}

impl Renderer {
    pub fn new(config: &LabConfig) -> Result<Self> {
        let context = Value::from_serialize(config.template_context()?);
        Ok(Self { context })
    }

    /// Render a single manifest source.
    ///
    /// Manifests that are not valid Jinja (for example upstream files
    /// carrying Go templates for Prometheus alerts) are returned unchanged.
    pub fn render(&self, template_name: &str, source: &str) -> Result<String> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env.set_keep_trailing_newline(true);

        let template = match env.template_from_named_str(template_name, source) {
            Ok(template) => template,
            Err(err) if err.kind() == ErrorKind::SyntaxError => {
                tracing::debug!(template = template_name, error = %err, "not a Jinja template, using raw text");
                return Ok(source.to_string());
            }
            Err(err) => return Err(TemplateError::from_minijinja(err, template_name, source).into()),
        };

        template
            .render(&self.context)
            .map_err(|err| TemplateError::from_minijinja(err, template_name, source).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LabConfig {
        LabConfig::from_json(
            r#"{
                "nginx": { "base_url": "https://lab.example.com" },
                "arma3": {
                    "hostname": "Example Arma Server",
                    "admin_password": "adminpw",
                    "server_password": "serverpw",
                    "server_command_password": "commandpw",
                    "steamcmd": { "username": "exampleuser", "password": "steampw" }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_render_config_values() {
        let renderer = Renderer::new(&config()).unwrap();
        let out = renderer
            .render(
                "secret.yaml",
                "password: {{ arma3.admin_password }}\nhost: {{ base_host }}\n",
            )
            .unwrap();
        assert_eq!(out, "password: adminpw\nhost: lab.example.com\n");
    }

    #[test]
    fn test_render_undefined_is_lenient() {
        let renderer = Renderer::new(&config()).unwrap();
        let out = renderer.render("x.yaml", "value: '{{ missing }}'").unwrap();
        assert_eq!(out, "value: ''");
    }

    #[test]
    fn test_syntax_error_falls_back_to_raw() {
        let renderer = Renderer::new(&config()).unwrap();
        let source = "description: '{{ $labels.instance }} is down'\n";
        let out = renderer.render("alerts.yaml", source).unwrap();
        assert_eq!(out, source);
    }

    #[test]
    fn test_render_error_is_reported() {
        let renderer = Renderer::new(&config()).unwrap();
        let err = renderer
            .render("bad.yaml", "value: {{ arma3.hostname | no_such_filter }}")
            .unwrap_err();
        assert!(matches!(err, crate::EngineError::Template(_)));
    }
}
