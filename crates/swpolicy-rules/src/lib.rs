//! Ordered caching rules for service-worker policies.
//!
//! A [`RuleSet`] is the intermediate representation shared by the policy
//! compiler (which serializes it into program text) and the reference
//! engine (which interprets it). Rules are evaluated in declaration order
//! and the first match wins.

mod error;
mod matcher;
mod rule;
mod strategy;

pub use error::RuleError;
pub use matcher::{
    CompiledMatcher, Destination, Matcher, PatternTarget, RequestInfo, DEFAULT_ORIGIN,
};
pub use rule::{
    CachingRule, CompiledRuleSet, Expiration, Lifecycle, PrecacheEntry, PrecacheManifest,
    ReplayQueue, RuleOrigin, RuleSet,
};
pub use strategy::Strategy;
