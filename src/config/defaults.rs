//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Workbox bundle imported by the generated worker.
pub const DEFAULT_WORKBOX_URL: &str =
    "https://storage.googleapis.com/workbox-cdn/releases/7.1.0/workbox-sw.js";

/// Built-in option values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Max age of the static-asset rule in seconds (default: 86400 = 24 hours)
    pub cache_static_assets_duration: u64,

    /// Prefix of every generated cache name (default: "astro")
    pub cache_name_prefix: String,

    /// Output file name (default: "service-worker.js")
    pub sw_name: String,

    pub skip_waiting: bool,
    pub clients_claim: bool,
    pub cleanup_outdated_caches: bool,
    pub debug: bool,
    pub workbox_url: String,

    /// Default rule preset (default: "auto")
    pub preset: String,

    /// Globs hashed into the build manifest
    pub glob_patterns: Vec<String>,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            cache_static_assets_duration: 24 * 60 * 60,
            cache_name_prefix: "astro".to_string(),
            sw_name: "service-worker.js".to_string(),
            skip_waiting: true,
            clients_claim: true,
            cleanup_outdated_caches: true,
            debug: false,
            workbox_url: DEFAULT_WORKBOX_URL.to_string(),
            preset: "auto".to_string(),
            glob_patterns: vec!["**/*.{js,css,html}".to_string()],
        }
    }
}

impl BuiltinDefaults {
    /// Convert to a JSON layer using the option file's key names
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "cacheStaticAssetsDuration": self.cache_static_assets_duration,
            "cacheStaticAssetsExtensions": [],
            "apiCachePatterns": [],
            "cachingStrategies": {},
            "runtimeCaching": [],
            "cacheNamePrefix": self.cache_name_prefix,
            "precacheFiles": [],
            "swName": self.sw_name,
            "skipWaiting": self.skip_waiting,
            "clientsClaim": self.clients_claim,
            "cleanupOutdatedCaches": self.cleanup_outdated_caches,
            "debug": self.debug,
            "workboxUrl": self.workbox_url,
            "preset": self.preset,
            "globPatterns": self.glob_patterns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.cache_static_assets_duration, 86400);
        assert_eq!(defaults.cache_name_prefix, "astro");
        assert_eq!(defaults.sw_name, "service-worker.js");
        assert!(defaults.skip_waiting);
        assert!(!defaults.debug);
    }

    #[test]
    fn test_to_value_has_no_background_sync() {
        let value = BuiltinDefaults::default().to_value();

        assert_eq!(value["cacheStaticAssetsDuration"], 86400);
        assert_eq!(value["preset"], "auto");
        assert!(value["cachingStrategies"].as_object().unwrap().is_empty());
        assert!(value.get("backgroundSync").is_none());
    }
}
