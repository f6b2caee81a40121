//! Development-mode worker.

use std::path::{Path, PathBuf};

use crate::config::{ConfigError, EffectiveConfig, ServiceWorkerOptions};
use crate::inject::{persist, InjectError};

/// Installs and activates immediately; registers no caching rules.
pub const NOOP_WORKER: &str = "// This is a noop service worker for development\n\
self.addEventListener('install', () => self.skipWaiting());\n\
self.addEventListener('activate', () => self.clients.claim());\n";

/// File name for the development worker.
///
/// Dev mode never fails on configuration: an unreadable or malformed config
/// falls back to `sw_name_override`, then to the default worker name.
pub fn dev_worker_name(
    loaded: Result<EffectiveConfig, ConfigError>,
    sw_name_override: Option<&str>,
) -> String {
    match loaded {
        Ok(effective) => effective.options().sw_name.clone(),
        Err(e) => {
            tracing::warn!(error = %e, "config not loaded, using default worker name");
            sw_name_override
                .map(str::to_string)
                .unwrap_or_else(|| ServiceWorkerOptions::default().sw_name)
        }
    }
}

/// Write the no-op worker to `<public_dir>/<sw_name>`.
pub fn write_dev_worker(public_dir: &Path, sw_name: &str) -> Result<PathBuf, InjectError> {
    let path = public_dir.join(sw_name);
    persist(&path, NOOP_WORKER)?;
    tracing::info!(path = %path.display(), "wrote development service worker");
    Ok(path)
}
