//! Configuration layering
//!
//! Options resolve through three layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. Config file (swpolicy.toml)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;
mod options;

pub use defaults::{BuiltinDefaults, DEFAULT_WORKBOX_URL};
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, DEFAULT_CONFIG_FILE};
pub use merge::{deep_merge, merge_layers};
pub use options::{
    BackgroundSyncOptions, BackgroundSyncQueueOptions, Preset, RuntimeCachingEntry,
    RuntimeCachingOptions, ServiceWorkerOptions, UrlPattern,
};
