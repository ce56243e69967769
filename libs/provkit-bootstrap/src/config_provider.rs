use crate::config::RuntimeConfig;
use provkit::{ConfigField, ConfigLoader};
use std::sync::Arc;

/// Serves provider config fields from the `provider_config` section of a [`RuntimeConfig`].
pub struct RuntimeConfigLoader(Arc<RuntimeConfig>);

impl RuntimeConfigLoader {
    pub fn new(config: RuntimeConfig) -> Self {
        Self(Arc::new(config))
    }

    pub fn from_arc(config: Arc<RuntimeConfig>) -> Self {
        Self(config)
    }

    pub fn inner(&self) -> &RuntimeConfig {
        &self.0
    }
}

impl ConfigLoader for RuntimeConfigLoader {
    fn load(&self, field: &ConfigField) -> anyhow::Result<Option<String>> {
        Ok(self.0.provider_value(&field.id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provkit::{ConfigSchema, Diagnostics, ProviderConfig, REDACTED};
    use serde_json::json;

    fn loader(pairs: &[(&str, &str)]) -> RuntimeConfigLoader {
        let mut config = RuntimeConfig::default();
        for (k, v) in pairs {
            config.provider_config.insert(k.to_string(), v.to_string());
        }
        RuntimeConfigLoader::new(config)
    }

    #[test]
    fn loads_declared_fields_and_redacts_secrets() {
        let schema = ConfigSchema::new(vec![
            ConfigField::new("org_url"),
            ConfigField::new("api_token").secret(),
        ]);
        let diagnostics = Diagnostics::new();
        let cfg = ProviderConfig::load(
            schema,
            &loader(&[("org_url", "https://acme.example.org"), ("api_token", "t0k")]),
            &diagnostics,
        );

        assert!(diagnostics.has_no_errors());
        assert_eq!(cfg.get("api_token"), Some("t0k"));
        assert_eq!(
            serde_json::Value::Object(cfg.safe()),
            json!({"org_url": "https://acme.example.org", "api_token": REDACTED})
        );
    }

    #[test]
    fn unresolved_env_reference_becomes_a_diagnostic() {
        let schema = ConfigSchema::new(vec![ConfigField::new("api_token").secret()]);
        let diagnostics = Diagnostics::new();
        let cfg = ProviderConfig::load(
            schema,
            &loader(&[("api_token", "${PROVKIT_LOADER_TEST_UNSET}")]),
            &diagnostics,
        );

        assert!(cfg.get("api_token").is_none());
        let logs = diagnostics.export();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].msg.contains("PROVKIT_LOADER_TEST_UNSET"));
    }
}
