//! Caching rules, precache manifests and the ordered rule set.

use serde::{Deserialize, Serialize};

use crate::{CompiledMatcher, Matcher, RequestInfo, RuleError, Strategy};

/// Size and age bounds for a cache partition. `None` is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expiration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_seconds: Option<u64>,
}

impl Expiration {
    pub fn new(max_entries: Option<u32>, max_age_seconds: Option<u64>) -> Self {
        Self {
            max_entries,
            max_age_seconds,
        }
    }

    /// A zero bound is no bound, as in Workbox's `ExpirationPlugin`.
    pub fn normalized(&self) -> Self {
        Self {
            max_entries: self.max_entries.filter(|&n| n > 0),
            max_age_seconds: self.max_age_seconds.filter(|&s| s > 0),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        let bounds = self.normalized();
        bounds.max_entries.is_none() && bounds.max_age_seconds.is_none()
    }
}

/// Queue that stores failed requests for later replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayQueue {
    pub name: String,
    /// Retention window in minutes.
    pub max_retention_minutes: u64,
}

impl ReplayQueue {
    pub fn new(name: impl Into<String>, max_retention_minutes: u64) -> Self {
        Self {
            name: name.into(),
            max_retention_minutes,
        }
    }

    pub fn retention_seconds(&self) -> u64 {
        self.max_retention_minutes.saturating_mul(60)
    }
}

/// Which configuration surface produced a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOrigin {
    StaticAssets,
    ApiCache,
    CachingStrategy,
    Preset,
    RuntimeCaching,
    BackgroundSync,
}

impl RuleOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleOrigin::StaticAssets => "static_assets",
            RuleOrigin::ApiCache => "api_cache",
            RuleOrigin::CachingStrategy => "caching_strategy",
            RuleOrigin::Preset => "preset",
            RuleOrigin::RuntimeCaching => "runtime_caching",
            RuleOrigin::BackgroundSync => "background_sync",
        }
    }
}

/// A single runtime route: matcher plus strategy and its options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachingRule {
    pub origin: RuleOrigin,
    pub matcher: Matcher,
    pub strategy: Strategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Expiration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_queue: Option<ReplayQueue>,
}

impl CachingRule {
    pub fn new(origin: RuleOrigin, matcher: Matcher, strategy: Strategy) -> Self {
        Self {
            origin,
            matcher,
            strategy,
            cache_name: None,
            expiration: None,
            network_timeout_seconds: None,
            replay_queue: None,
        }
    }

    pub fn with_cache_name(mut self, cache_name: impl Into<String>) -> Self {
        self.cache_name = Some(cache_name.into());
        self
    }

    pub fn with_expiration(mut self, expiration: Expiration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_network_timeout(mut self, seconds: u64) -> Self {
        self.network_timeout_seconds = Some(seconds);
        self
    }

    pub fn with_replay_queue(mut self, queue: ReplayQueue) -> Self {
        self.replay_queue = Some(queue);
        self
    }

    /// Cache partition this rule reads and writes, if any.
    pub fn partition(&self) -> Option<&str> {
        if self.strategy.uses_cache() {
            self.cache_name.as_deref()
        } else {
            None
        }
    }

    /// Expiration that actually applies: only cache-writing rules expire.
    pub fn effective_expiration(&self) -> Option<Expiration> {
        self.expiration
            .filter(|e| self.strategy.uses_cache() && !e.is_unbounded())
            .map(|e| e.normalized())
    }

    pub fn route_method(&self) -> &str {
        self.matcher.route_method()
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        CompiledMatcher::new(self.matcher.clone())?;
        if let Some(queue) = &self.replay_queue {
            if self.strategy != Strategy::NetworkOnly {
                return Err(RuleError::ReplayRequiresNetworkOnly {
                    queue: queue.name.clone(),
                    strategy: self.strategy,
                });
            }
        }
        Ok(())
    }
}

/// One precached URL. `revision: None` leaves the asset unversioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheEntry {
    pub url: String,
    pub revision: Option<String>,
}

impl PrecacheEntry {
    pub fn unversioned(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            revision: None,
        }
    }
}

/// URL-deduplicated precache list in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrecacheManifest {
    entries: Vec<PrecacheEntry>,
}

impl PrecacheManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; returns false when the URL is already present.
    pub fn push(&mut self, entry: PrecacheEntry) -> bool {
        if self.contains(&entry.url) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.iter().any(|e| e.url == url)
    }

    pub fn entries(&self) -> &[PrecacheEntry] {
        &self.entries
    }

    pub fn urls(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.url.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<PrecacheEntry> for PrecacheManifest {
    fn from_iter<I: IntoIterator<Item = PrecacheEntry>>(iter: I) -> Self {
        let mut manifest = PrecacheManifest::new();
        for entry in iter {
            manifest.push(entry);
        }
        manifest
    }
}

/// Worker lifecycle directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    pub skip_waiting: bool,
    pub clients_claim: bool,
    pub cleanup_outdated_caches: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            skip_waiting: true,
            clients_claim: true,
            cleanup_outdated_caches: true,
        }
    }
}

/// The complete policy: lifecycle, precache list and ordered routes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub lifecycle: Lifecycle,
    /// Whether the build's asset-hash manifest is precached ahead of `precache`.
    pub include_build_manifest: bool,
    pub precache: PrecacheManifest,
    pub rules: Vec<CachingRule>,
}

impl RuleSet {
    /// Cache partitions named by rules, in first-declared order.
    pub fn declared_cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self.rules.iter().filter_map(|r| r.partition()) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    pub fn replay_queues(&self) -> Vec<&ReplayQueue> {
        self.rules
            .iter()
            .filter_map(|r| r.replay_queue.as_ref())
            .collect()
    }

    /// Validate every rule, and require rules sharing a replay queue name to
    /// agree on its retention. The worker registers each name once.
    pub fn validate(&self) -> Result<(), RuleError> {
        self.rules.iter().try_for_each(CachingRule::validate)?;
        self.check_replay_queues()
    }

    fn check_replay_queues(&self) -> Result<(), RuleError> {
        let queues = self.replay_queues();
        for (i, queue) in queues.iter().enumerate() {
            let conflict = queues[..i].iter().find(|earlier| {
                earlier.name == queue.name
                    && earlier.max_retention_minutes != queue.max_retention_minutes
            });
            if let Some(earlier) = conflict {
                return Err(RuleError::ConflictingReplayQueue {
                    queue: queue.name.clone(),
                    first_minutes: earlier.max_retention_minutes,
                    second_minutes: queue.max_retention_minutes,
                });
            }
        }
        Ok(())
    }

    pub fn compile(&self) -> Result<CompiledRuleSet, RuleError> {
        self.check_replay_queues()?;
        let mut routes = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            rule.validate()?;
            routes.push((rule.clone(), CompiledMatcher::new(rule.matcher.clone())?));
        }
        Ok(CompiledRuleSet { routes })
    }
}

/// Rule set with matchers compiled, ready for dispatch.
#[derive(Debug, Clone)]
pub struct CompiledRuleSet {
    routes: Vec<(CachingRule, CompiledMatcher)>,
}

impl CompiledRuleSet {
    /// First rule matching the request, with its declaration index.
    pub fn first_match(&self, request: &RequestInfo) -> Option<(usize, &CachingRule)> {
        self.routes
            .iter()
            .enumerate()
            .find(|(_, (rule, matcher))| {
                rule.route_method() == request.method && matcher.matches(request)
            })
            .map(|(index, (rule, _))| (index, rule))
    }

    pub fn rules(&self) -> impl Iterator<Item = &CachingRule> {
        self.routes.iter().map(|(rule, _)| rule)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
