//! Typed compile-time options.
//!
//! Every field has a default, so any subset of keys deserializes. Strategy
//! names stay strings here and are parsed by the compiler, which reports an
//! unknown name as a compile error rather than a config error.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use swpolicy_rules::{Expiration, Matcher};

use super::defaults::BuiltinDefaults;

/// Whether the built-in five-category rule set is used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Used only when no rule-producing option is set.
    #[default]
    Auto,
    /// Always prepended to `runtimeCaching`.
    Recommended,
    #[serde(rename = "none")]
    Disabled,
}

/// URL predicate of a runtime caching entry.
///
/// A bare string is a regular expression tested against the full URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlPattern {
    Regex(String),
    Match(Matcher),
}

impl UrlPattern {
    pub fn to_matcher(&self) -> Matcher {
        match self {
            UrlPattern::Regex(pattern) => Matcher::url_pattern(pattern.clone()),
            UrlPattern::Match(matcher) => matcher.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BackgroundSyncQueueOptions {
    /// Minutes a queued request is retried before being dropped.
    #[serde(default = "default_retention_minutes")]
    pub max_retention_time: u64,
}

fn default_retention_minutes() -> u64 {
    24 * 60
}

impl Default for BackgroundSyncQueueOptions {
    fn default() -> Self {
        Self {
            max_retention_time: default_retention_minutes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackgroundSyncOptions {
    pub name: String,
    #[serde(default)]
    pub options: BackgroundSyncQueueOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuntimeCachingOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Expiration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_sync: Option<BackgroundSyncOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuntimeCachingEntry {
    pub url_pattern: UrlPattern,
    pub handler: String,
    #[serde(default)]
    pub options: RuntimeCachingOptions,
}

/// Merged options handed to the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ServiceWorkerOptions {
    pub cache_static_assets_duration: u64,
    pub cache_static_assets_extensions: Vec<String>,
    pub api_cache_patterns: Vec<String>,
    pub caching_strategies: IndexMap<String, String>,
    pub runtime_caching: Vec<RuntimeCachingEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_sync: Option<BackgroundSyncOptions>,
    pub cache_name_prefix: String,
    pub precache_files: Vec<String>,
    pub sw_name: String,
    pub skip_waiting: bool,
    pub clients_claim: bool,
    pub cleanup_outdated_caches: bool,
    pub debug: bool,
    pub workbox_url: String,
    pub preset: Preset,
    pub glob_patterns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_service_worker: Option<PathBuf>,
}

impl Default for ServiceWorkerOptions {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            cache_static_assets_duration: defaults.cache_static_assets_duration,
            cache_static_assets_extensions: Vec::new(),
            api_cache_patterns: Vec::new(),
            caching_strategies: IndexMap::new(),
            runtime_caching: Vec::new(),
            background_sync: None,
            cache_name_prefix: defaults.cache_name_prefix,
            precache_files: Vec::new(),
            sw_name: defaults.sw_name,
            skip_waiting: defaults.skip_waiting,
            clients_claim: defaults.clients_claim,
            cleanup_outdated_caches: defaults.cleanup_outdated_caches,
            debug: defaults.debug,
            workbox_url: defaults.workbox_url,
            preset: Preset::default(),
            glob_patterns: defaults.glob_patterns,
            custom_service_worker: None,
        }
    }
}

impl ServiceWorkerOptions {
    /// Whether any option that produces runtime rules is set.
    pub fn has_custom_rules(&self) -> bool {
        !self.api_cache_patterns.is_empty()
            || !self.caching_strategies.is_empty()
            || !self.runtime_caching.is_empty()
            || self.background_sync.is_some()
    }

    /// File stem of the worker, used to keep it out of the precache list.
    pub fn sw_stem(&self) -> &str {
        self.sw_name.split('.').next().unwrap_or(&self.sw_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_gets_defaults() {
        let options: ServiceWorkerOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(options, ServiceWorkerOptions::default());
        assert_eq!(options.cache_name_prefix, "astro");
        assert_eq!(options.preset, Preset::Auto);
    }

    #[test]
    fn test_defaults_match_builtin_layer() {
        let from_layer: ServiceWorkerOptions =
            serde_json::from_value(BuiltinDefaults::default().to_value()).unwrap();
        assert_eq!(from_layer, ServiceWorkerOptions::default());
    }

    #[test]
    fn test_url_pattern_forms() {
        let entries: Vec<RuntimeCachingEntry> = serde_json::from_value(json!([
            {"urlPattern": "\\.png$", "handler": "CacheFirst"},
            {"urlPattern": {"type": "path_prefix", "prefix": "/docs/"}, "handler": "NetworkFirst",
             "options": {"cacheName": "docs", "networkTimeoutSeconds": 3}}
        ]))
        .unwrap();

        assert_eq!(entries[0].url_pattern, UrlPattern::Regex("\\.png$".to_string()));
        assert_eq!(entries[1].url_pattern.to_matcher(), Matcher::path_prefix("/docs/"));
        assert_eq!(entries[1].options.network_timeout_seconds, Some(3));
    }

    #[test]
    fn test_background_sync_retention_default() {
        let options: ServiceWorkerOptions =
            serde_json::from_value(json!({"backgroundSync": {"name": "q"}})).unwrap();
        let sync = options.background_sync.unwrap();
        assert_eq!(sync.options.max_retention_time, 24 * 60);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result: Result<ServiceWorkerOptions, _> =
            serde_json::from_value(json!({"cacheNamePrefx": "typo"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_preset_names() {
        let options: ServiceWorkerOptions =
            serde_json::from_value(json!({"preset": "none"})).unwrap();
        assert_eq!(options.preset, Preset::Disabled);
    }

    #[test]
    fn test_sw_stem() {
        let options = ServiceWorkerOptions::default();
        assert_eq!(options.sw_stem(), "service-worker");
    }
}
