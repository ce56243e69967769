//! Provider contract: what a plugin author implements.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::diagnostics::Diagnostics;
use crate::registry::NamespaceBuilder;

/// Shown in place of secret config values.
pub const REDACTED: &str = "*****";

/// An access provider.
///
/// The runtime calls [`Provider::register`] once to build the namespace, then
/// [`Provider::setup`] with the loaded configuration. Both run before any event
/// is dispatched.
pub trait Provider: Sized + Send + Sync + 'static {
    /// Configuration the provider expects, exported in the schema `config` section.
    fn config_schema() -> ConfigSchema {
        ConfigSchema::default()
    }

    /// Declares resources, targets and loaders.
    fn register(ns: &mut NamespaceBuilder<Self>);

    /// Prepares clients from config. Problems worth surfacing go to `diagnostics`;
    /// a returned error is recorded there as well.
    fn setup(&mut self, _config: &ProviderConfig, _diagnostics: &Diagnostics) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs on every Describe against a fork of the diagnostics log.
    fn health_check(&self, _diagnostics: &Diagnostics) {}
}

/// Identity reported by Describe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub publisher: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigField {
    pub id: String,
    pub description: Option<String>,
    pub secret: bool,
    pub optional: bool,
}

impl ConfigField {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            secret: false,
            optional: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSchema {
    fields: Vec<ConfigField>,
}

impl ConfigSchema {
    pub fn new(fields: Vec<ConfigField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[ConfigField] {
        &self.fields
    }

    pub fn export(&self) -> Value {
        let mut out = Map::new();
        for f in &self.fields {
            let mut entry = Map::new();
            entry.insert("type".into(), json!("string"));
            if let Some(d) = &f.description {
                entry.insert("description".into(), json!(d));
            }
            entry.insert("secret".into(), json!(f.secret));
            entry.insert("optional".into(), json!(f.optional));
            out.insert(f.id.clone(), Value::Object(entry));
        }
        Value::Object(out)
    }
}

/// Source of config values, e.g. process environment or a secrets store.
pub trait ConfigLoader: Send + Sync {
    fn load(&self, field: &ConfigField) -> anyhow::Result<Option<String>>;
}

/// Loads nothing; every field is left unset.
pub struct NoopLoader;

impl ConfigLoader for NoopLoader {
    fn load(&self, _field: &ConfigField) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

/// Loads from an in-memory map keyed by field id.
#[derive(Debug, Clone, Default)]
pub struct MapLoader(pub IndexMap<String, String>);

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapLoader {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl ConfigLoader for MapLoader {
    fn load(&self, field: &ConfigField) -> anyhow::Result<Option<String>> {
        Ok(self.0.get(&field.id).cloned())
    }
}

/// Loaded configuration values.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    schema: ConfigSchema,
    values: IndexMap<String, String>,
}

impl ProviderConfig {
    /// Fetches every declared field through `loader`.
    ///
    /// Missing required values and loader failures are recorded as diagnostics
    /// errors; loading itself never fails.
    pub fn load(schema: ConfigSchema, loader: &dyn ConfigLoader, diagnostics: &Diagnostics) -> Self {
        let mut values = IndexMap::new();
        for field in schema.fields() {
            match loader.load(field) {
                Ok(Some(v)) => {
                    values.insert(field.id.clone(), v);
                }
                Ok(None) if field.optional => {}
                Ok(None) => diagnostics.error(format!("missing required config value '{}'", field.id)),
                Err(e) => diagnostics.error(format!("failed to load config value '{}': {e:#}", field.id)),
            }
        }
        Self { schema, values }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.values.get(id).map(String::as_str)
    }

    pub fn schema(&self) -> &ConfigSchema {
        &self.schema
    }

    /// Values safe to report: secrets are replaced with [`REDACTED`].
    pub fn safe(&self) -> Map<String, Value> {
        self.schema
            .fields()
            .iter()
            .filter_map(|f| {
                let v = self.values.get(&f.id)?;
                let shown = if f.secret { REDACTED } else { v.as_str() };
                Some((f.id.clone(), Value::String(shown.to_string())))
            })
            .collect()
    }
}
