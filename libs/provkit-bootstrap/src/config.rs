use anyhow::{Context, Result};
use provkit::ProviderInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment prefix for overrides, e.g. `PROVKIT__PROVIDER__NAME=okta`.
pub const ENV_PREFIX: &str = "PROVKIT__";

/// Host configuration for a provider runtime.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Identity reported by Describe.
    #[serde(default)]
    pub provider: ProviderIdentity,
    /// Logging configuration (optional, console-only INFO if None).
    pub logging: Option<LoggingConfig>,
    /// Base directory for relative log file paths.
    #[serde(default)]
    pub log_dir: Option<String>,
    /// Raw values for the provider's declared config fields. `${VAR}` is expanded on load.
    #[serde(default)]
    pub provider_config: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderIdentity {
    pub publisher: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
}

impl From<ProviderIdentity> for ProviderInfo {
    fn from(id: ProviderIdentity) -> Self {
        ProviderInfo {
            publisher: id.publisher,
            name: id.name,
            version: id.version,
        }
    }
}

/// Logging configuration - maps target prefixes to their logging settings.
/// Key "default" is the catch-all for logs that don't match an explicit target.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/provider.log", empty disables the file sink
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

/// Create a default logging configuration.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: String::new(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl RuntimeConfig {
    /// Layered loading: defaults → YAML file → `PROVKIT__` environment variables.
    ///
    /// The file must exist; a missing path is an error rather than an empty layer.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::providers::{Format, Yaml};

        let path = config_path.as_ref();
        if !path.is_file() {
            anyhow::bail!("config file '{}' does not exist", path.display());
        }

        Self::extract(Self::default(), |figment| figment.merge(Yaml::file_exact(path)))
    }

    /// Load configuration from file, or from defaults plus environment when no file is given.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => Self::extract(
                Self {
                    logging: Some(default_logging_config()),
                    ..Self::default()
                },
                |figment| figment,
            ),
        }
    }

    fn extract(
        defaults: RuntimeConfig,
        file_layer: impl FnOnce(figment::Figment) -> figment::Figment,
    ) -> Result<Self> {
        use figment::{
            providers::{Env, Serialized},
            Figment,
        };

        let figment = file_layer(Figment::new().merge(Serialized::defaults(defaults)))
            // Example: PROVKIT__PROVIDER__VERSION=v1 maps to provider.version
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment
            .extract()
            .with_context(|| "Failed to extract config from figment".to_string())
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        let logging = self.logging.get_or_insert_with(default_logging_config);
        let default_section = logging.entry("default".to_string()).or_insert_with(|| Section {
            console_level: "info".to_string(),
            file: String::new(),
            file_level: String::new(),
            max_age_days: None,
            max_backups: None,
            max_size_mb: None,
        });
        default_section.console_level = match args.verbose {
            0 => default_section.console_level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        };
    }

    /// Directory relative log paths resolve against.
    pub fn log_base_dir(&self) -> PathBuf {
        self.log_dir
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Provider config value with `${VAR}` references expanded.
    pub fn provider_value(&self, id: &str) -> Result<Option<String>, ConfigError> {
        self.provider_config
            .get(id)
            .map(|raw| expand_env(id, raw))
            .transpose()
    }
}

/// Command line arguments structure.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable '{var}' referenced by provider config '{key}' is not set")]
    MissingEnvVar { key: String, var: String },
    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

/// Replaces every `${VARNAME}` in `value` with the environment variable's value.
pub fn expand_env(key: &str, value: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")?;

    let mut result = value.to_string();
    for cap in re.captures_iter(value) {
        let var = &cap[1];
        let resolved = std::env::var(var).map_err(|_| ConfigError::MissingEnvVar {
            key: key.to_string(),
            var: var.to_string(),
        })?;
        result = result.replace(&cap[0], &resolved);
    }
    Ok(result)
}
