//! swpolicy - caching-policy compiler for static sites
//!
//! Compiles declarative caching options and a site's routes into a
//! service-worker program: precaching, per-resource runtime strategies and
//! background replay of failed POST requests.

pub mod assets;
pub mod bootstrap;
pub mod compiler;
pub mod config;
pub mod dev;
pub mod explain;
pub mod inject;
pub mod pipeline;
pub mod routes;

pub use compiler::{compile, CompileError, Compilation, PolicyCompiler};
pub use config::{ConfigError, EffectiveConfig, ServiceWorkerOptions};
pub use inject::{inject, InjectError, CUSTOM_CODE_SEPARATOR};
pub use pipeline::{build, run_build, BuildError, BuildOutcome, BuildReport};
pub use routes::Route;
pub use swpolicy_rules as rules;
