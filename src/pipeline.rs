//! Production build: the full compile-and-persist sequence.
//!
//! Stale worker removal → routes → rule set → program → asset manifest →
//! custom-code injection → write. [`run_build`] is the build-hook boundary:
//! failures are logged and the build continues without a worker.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::assets::{AssetError, AssetManifest};
use crate::compiler::{CompileError, PolicyCompiler};
use crate::config::{ConfigError, ServiceWorkerOptions};
use crate::inject::{inject, remove_if_exists, InjectError};
use crate::routes::{enumerate_routes, Route, RouteError};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("routes: {0}")]
    Routes(#[from] RouteError),

    #[error("compile: {0}")]
    Compile(#[from] CompileError),

    #[error("assets: {0}")]
    Assets(#[from] AssetError),

    #[error("inject: {0}")]
    Inject(#[from] InjectError),

    #[error("failed to remove stale worker {path}: {source}")]
    RemoveStale {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Summary of a generated worker.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub output: PathBuf,
    pub fingerprint: String,
    pub rules: usize,
    pub precached: usize,
    pub hashed_assets: usize,
    pub bytes: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub enum BuildOutcome {
    Generated(BuildReport),
    /// The build step failed and no worker was written.
    Skipped { error: BuildError },
}

impl BuildOutcome {
    pub fn is_generated(&self) -> bool {
        matches!(self, BuildOutcome::Generated(_))
    }
}

/// Generate `<out_dir>/<swName>`.
///
/// `routes` of `None` enumerates the HTML pages already in `out_dir`.
pub fn build(
    out_dir: &Path,
    options: &ServiceWorkerOptions,
    routes: Option<&[Route]>,
) -> Result<BuildReport, BuildError> {
    let output = out_dir.join(&options.sw_name);
    remove_if_exists(&output).map_err(|source| BuildError::RemoveStale {
        path: output.clone(),
        source,
    })?;

    let enumerated;
    let routes = match routes {
        Some(routes) => routes,
        None => {
            enumerated = enumerate_routes(out_dir)?;
            &enumerated[..]
        }
    };

    let compilation = PolicyCompiler::new(options).compile(routes)?;
    let assets = AssetManifest::scan(
        out_dir,
        &options.glob_patterns,
        &options.sw_name,
        &compilation.rule_set.precache,
    )?;
    let program = assets.substitute(&compilation.program)?;
    let final_text = inject(&program, &output, options.custom_service_worker.as_deref())?;

    let report = BuildReport {
        output,
        fingerprint: compilation.fingerprint,
        rules: compilation.rule_set.rules.len(),
        precached: compilation.rule_set.precache.len(),
        hashed_assets: assets.len(),
        bytes: final_text.len(),
        warnings: compilation.conflicts.iter().map(ToString::to_string).collect(),
    };
    tracing::info!(
        path = %report.output.display(),
        rules = report.rules,
        precached = report.precached,
        hashed_assets = report.hashed_assets,
        "generated service worker"
    );
    Ok(report)
}

/// [`build`] behind the error boundary: failures are logged, never raised.
pub fn run_build(
    out_dir: &Path,
    options: &ServiceWorkerOptions,
    routes: Option<&[Route]>,
) -> BuildOutcome {
    match build(out_dir, options, routes) {
        Ok(report) => BuildOutcome::Generated(report),
        Err(error) => {
            tracing::error!(error = %error, "error generating service worker");
            BuildOutcome::Skipped { error }
        }
    }
}
