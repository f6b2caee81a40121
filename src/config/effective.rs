//! Effective configuration with provenance
//!
//! Captures the merged option object plus where each layer came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use super::options::ServiceWorkerOptions;

/// Schema version for effective_config
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "swpolicy/effective_config@1";

/// Config file read when none is given explicitly
pub const DEFAULT_CONFIG_FILE: &str = "swpolicy.toml";

/// Origin of a configuration layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing layer with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Effective configuration with provenance
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub schema_version: u32,
    pub schema_id: String,

    /// When this config was computed
    pub created_at: DateTime<Utc>,

    /// The merged option object
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,

    #[serde(skip)]
    options: ServiceWorkerOptions,
}

impl EffectiveConfig {
    /// Build effective config from layers
    ///
    /// A missing `config_path` is skipped; an unreadable or malformed one is
    /// an error.
    pub fn build(
        config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = Vec::new();
        let mut sources = Vec::new();

        layers.push(BuiltinDefaults::default().to_value());
        sources.push(ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        });

        if let Some(path) = config_path {
            if path.exists() {
                let (value, digest) = Self::load_toml_file(path)?;
                layers.push(value);
                sources.push(ConfigSource {
                    origin: ConfigOrigin::File,
                    path: Some(path.to_string_lossy().to_string()),
                    digest: Some(digest),
                });
            } else {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
            }
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let options: ServiceWorkerOptions = serde_json::from_value(merged.clone())
            .map_err(|e| ConfigError::ParseError(format!("invalid options: {}", e)))?;
        Self::validate_options(&options)?;

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merged,
            sources,
            options,
        })
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;

        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        Ok((toml_to_json(toml_value), digest))
    }

    fn validate_options(options: &ServiceWorkerOptions) -> Result<(), ConfigError> {
        if options.cache_name_prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "cacheNamePrefix must not be empty".to_string(),
            ));
        }

        let name = &options.sw_name;
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(ConfigError::ValidationError(format!(
                "swName must be a plain file name, got '{}'",
                name
            )));
        }

        if let Some(sync) = &options.background_sync {
            if sync.name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "backgroundSync.name must not be empty".to_string(),
                ));
            }
        }

        if options.workbox_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "workboxUrl must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// The merged options, typed
    pub fn options(&self) -> &ServiceWorkerOptions {
        &self.options
    }

    pub fn into_options(self) -> ServiceWorkerOptions {
        self.options
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a config value by path (dot-separated)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }
}

/// Convert a TOML value to JSON, keeping table order
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_with_defaults_only() {
        let config = EffectiveConfig::build(None, None).unwrap();

        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.get_str("cacheNamePrefix"), Some("astro"));
        assert_eq!(config.options(), &ServiceWorkerOptions::default());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "cacheNamePrefix = \"docs\"").unwrap();
        writeln!(temp, "debug = false").unwrap();

        let cli = serde_json::json!({"debug": true});
        let config = EffectiveConfig::build(Some(temp.path()), Some(cli)).unwrap();

        assert_eq!(config.options().cache_name_prefix, "docs");
        assert!(config.options().debug);
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[1].origin, ConfigOrigin::File);
        assert_eq!(config.sources[1].digest.as_ref().unwrap().len(), 64);
    }

    #[test]
    fn test_load_nested_tables() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "apiCachePatterns = [\"/api/\"]").unwrap();
        writeln!(temp, "preset = \"none\"").unwrap();
        writeln!(temp, "[backgroundSync]").unwrap();
        writeln!(temp, "name = \"q\"").unwrap();
        writeln!(temp, "options = {{ maxRetentionTime = 60 }}").unwrap();
        writeln!(temp, "[cachingStrategies]").unwrap();
        writeln!(temp, "\"fonts\" = \"CacheFirst\"").unwrap();
        writeln!(temp, "\"cdn\" = \"StaleWhileRevalidate\"").unwrap();
        writeln!(temp, "[[runtimeCaching]]").unwrap();
        writeln!(temp, "urlPattern = \"\\\\.png$\"").unwrap();
        writeln!(temp, "handler = \"CacheFirst\"").unwrap();

        let config = EffectiveConfig::build(Some(temp.path()), None).unwrap();
        let options = config.options();

        assert_eq!(options.api_cache_patterns, vec!["/api/"]);
        assert_eq!(options.preset, Preset::Disabled);
        assert_eq!(options.background_sync.as_ref().unwrap().options.max_retention_time, 60);
        let keys: Vec<&String> = options.caching_strategies.keys().collect();
        assert_eq!(keys, vec!["fonts", "cdn"]);
        assert_eq!(options.runtime_caching.len(), 1);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let missing = Path::new("/nonexistent/swpolicy.toml");
        let config = EffectiveConfig::build(Some(missing), None).unwrap();
        assert_eq!(config.sources.len(), 1);
    }

    #[test]
    fn test_malformed_toml() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "cacheNamePrefix = ").unwrap();

        let err = EffectiveConfig::build(Some(temp.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validation_sw_name() {
        let cli = serde_json::json!({"swName": "nested/sw.js"});
        let err = EffectiveConfig::build(None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("swName"));
    }

    #[test]
    fn test_validation_empty_prefix() {
        let cli = serde_json::json!({"cacheNamePrefix": ""});
        let err = EffectiveConfig::build(None, Some(cli)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let cli = serde_json::json!({"cacheStaticAssetsDuration": "a day"});
        let err = EffectiveConfig::build(None, Some(cli)).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
