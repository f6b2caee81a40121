//! Caching-policy compiler
//!
//! Compilation runs in two stages: [`plan`] assembles the ordered
//! [`RuleSet`] from options and routes, then [`emit`] serializes it to
//! program text. The rule set is the same IR the reference engine runs.

mod emit;
mod plan;
mod preset;

pub use emit::emit;
pub use plan::{cache_name_conflicts, plan, precache_manifest, CacheNameConflict};
pub use preset::recommended as recommended_preset;

use serde::Serialize;
use sha2::{Digest, Sha256};
use swpolicy_rules::{RuleError, RuleSet};

use crate::config::ServiceWorkerOptions;
use crate::routes::Route;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("canonicalization failed: {0}")]
    Canonical(String),
}

/// Everything produced by one compile.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub rule_set: RuleSet,
    pub program: String,
    /// SHA-256 hex of the canonical options and rule set
    pub fingerprint: String,
    pub conflicts: Vec<CacheNameConflict>,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    options: &'a ServiceWorkerOptions,
    rule_set: &'a RuleSet,
}

/// Stable digest of the inputs that shape the program.
pub fn fingerprint(
    options: &ServiceWorkerOptions,
    rule_set: &RuleSet,
) -> Result<String, CompileError> {
    let jcs_bytes = serde_json_canonicalizer::to_vec(&FingerprintInput { options, rule_set })
        .map_err(|e| CompileError::Canonical(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(&jcs_bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub struct PolicyCompiler<'a> {
    options: &'a ServiceWorkerOptions,
}

impl<'a> PolicyCompiler<'a> {
    pub fn new(options: &'a ServiceWorkerOptions) -> Self {
        Self { options }
    }

    pub fn plan(&self, routes: &[Route]) -> Result<RuleSet, CompileError> {
        plan(self.options, routes)
    }

    pub fn compile(&self, routes: &[Route]) -> Result<Compilation, CompileError> {
        let rule_set = self.plan(routes)?;

        let conflicts = cache_name_conflicts(&rule_set);
        for conflict in &conflicts {
            tracing::warn!(
                cache = %conflict.cache_name,
                first_rule = conflict.first_rule,
                second_rule = conflict.second_rule,
                "rules share a cache name with different expiration"
            );
        }

        let fingerprint = fingerprint(self.options, &rule_set)?;
        let program = emit(self.options, &rule_set, &fingerprint)?;

        Ok(Compilation {
            rule_set,
            program,
            fingerprint,
            conflicts,
        })
    }
}

/// Compile `options` and `routes` to program text.
pub fn compile(options: &ServiceWorkerOptions, routes: &[Route]) -> Result<String, CompileError> {
    Ok(PolicyCompiler::new(options).compile(routes)?.program)
}
