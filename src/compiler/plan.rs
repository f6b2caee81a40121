//! Rule-set assembly: options and routes to the ordered rule IR.

use swpolicy_rules::{
    CachingRule, Expiration, Lifecycle, Matcher, PrecacheEntry, PrecacheManifest, ReplayQueue,
    RuleOrigin, RuleSet, Strategy,
};

use super::preset;
use super::CompileError;
use crate::config::{Preset, RuntimeCachingEntry, ServiceWorkerOptions};
use crate::routes::Route;

const API_MAX_ENTRIES: u32 = 50;
const API_MAX_AGE_SECONDS: u64 = 5 * 60;
const RUNTIME_MAX_ENTRIES: u32 = 50;
const RUNTIME_MAX_AGE_SECONDS: u64 = 24 * 60 * 60;

/// Two rules share a cache name but disagree on expiration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNameConflict {
    pub cache_name: String,
    pub first_rule: usize,
    pub second_rule: usize,
}

impl std::fmt::Display for CacheNameConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cache '{}' is shared by rules {} and {} with different expiration",
            self.cache_name, self.first_rule, self.second_rule
        )
    }
}

/// Whether `url` names the worker file (compared on the last path segment).
fn references_worker(url: &str, sw_stem: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(|segment| segment.split('.').next() == Some(sw_stem))
        .unwrap_or(false)
}

/// `precacheFiles` first, then route pathnames; duplicates keep their first
/// position and the worker never appears.
pub fn precache_manifest(options: &ServiceWorkerOptions, routes: &[Route]) -> PrecacheManifest {
    let stem = options.sw_stem();
    options
        .precache_files
        .iter()
        .map(String::as_str)
        .chain(routes.iter().map(|route| route.pathname.as_str()))
        .filter(|url| !references_worker(url, stem))
        .map(PrecacheEntry::unversioned)
        .collect()
}

fn parse_strategy(name: &str) -> Result<Strategy, CompileError> {
    Ok(name.parse::<Strategy>()?)
}

/// Turn a runtime entry into a rule.
///
/// User entries get the runtime defaults on every omitted axis; preset
/// entries are taken as written.
fn runtime_rule(
    entry: &RuntimeCachingEntry,
    origin: RuleOrigin,
    cache_name_prefix: &str,
) -> Result<CachingRule, CompileError> {
    let strategy = parse_strategy(&entry.handler)?;
    let mut rule = CachingRule::new(origin, entry.url_pattern.to_matcher(), strategy);
    let fill_defaults = origin == RuleOrigin::RuntimeCaching;

    if strategy.uses_cache() {
        let cache_name = match &entry.options.cache_name {
            Some(name) => name.clone(),
            None => format!("{}-runtime", cache_name_prefix),
        };
        rule = rule.with_cache_name(cache_name);

        let given = entry.options.expiration.unwrap_or_default();
        let expiration = if fill_defaults {
            Some(Expiration::new(
                given.max_entries.or(Some(RUNTIME_MAX_ENTRIES)),
                given.max_age_seconds.or(Some(RUNTIME_MAX_AGE_SECONDS)),
            ))
        } else {
            entry.options.expiration
        };
        if let Some(expiration) = expiration {
            rule = rule.with_expiration(expiration);
        }
    }

    if let Some(timeout) = entry.options.network_timeout_seconds {
        if strategy == Strategy::NetworkFirst {
            rule = rule.with_network_timeout(timeout);
        } else {
            tracing::warn!(
                strategy = %strategy,
                "networkTimeoutSeconds only applies to NetworkFirst, ignoring"
            );
        }
    }

    if let Some(sync) = &entry.options.background_sync {
        rule = rule.with_replay_queue(ReplayQueue::new(
            sync.name.clone(),
            sync.options.max_retention_time,
        ));
    }

    Ok(rule)
}

/// Build the ordered rule set. First match wins at runtime, so the order
/// here is the dispatch order.
pub fn plan(options: &ServiceWorkerOptions, routes: &[Route]) -> Result<RuleSet, CompileError> {
    let prefix = options.cache_name_prefix.as_str();
    let mut rules = Vec::new();

    rules.push(
        CachingRule::new(
            RuleOrigin::StaticAssets,
            Matcher::extensions(&options.cache_static_assets_extensions),
            Strategy::CacheFirst,
        )
        .with_cache_name(format!("{}-static-assets", prefix))
        .with_expiration(Expiration::new(None, Some(options.cache_static_assets_duration))),
    );

    for pattern in &options.api_cache_patterns {
        rules.push(
            CachingRule::new(
                RuleOrigin::ApiCache,
                Matcher::path_pattern(format!("^{}", pattern)),
                Strategy::NetworkFirst,
            )
            .with_cache_name(format!("{}-api", prefix))
            .with_expiration(Expiration::new(Some(API_MAX_ENTRIES), Some(API_MAX_AGE_SECONDS))),
        );
    }

    for (pattern, handler) in &options.caching_strategies {
        let strategy = parse_strategy(handler)?;
        let mut rule = CachingRule::new(
            RuleOrigin::CachingStrategy,
            Matcher::url_pattern(pattern.clone()),
            strategy,
        );
        if strategy.uses_cache() {
            rule = rule.with_cache_name(format!("{}-{}", prefix, pattern));
        }
        rules.push(rule);
    }

    let use_preset = match options.preset {
        Preset::Recommended => true,
        Preset::Auto => !options.has_custom_rules(),
        Preset::Disabled => false,
    };
    if use_preset {
        for entry in preset::recommended(prefix) {
            rules.push(runtime_rule(&entry, RuleOrigin::Preset, prefix)?);
        }
    }

    for entry in &options.runtime_caching {
        rules.push(runtime_rule(entry, RuleOrigin::RuntimeCaching, prefix)?);
    }

    if let Some(sync) = &options.background_sync {
        rules.push(
            CachingRule::new(
                RuleOrigin::BackgroundSync,
                Matcher::method("POST"),
                Strategy::NetworkOnly,
            )
            .with_replay_queue(ReplayQueue::new(
                sync.name.clone(),
                sync.options.max_retention_time,
            )),
        );
    }

    let rule_set = RuleSet {
        lifecycle: Lifecycle {
            skip_waiting: options.skip_waiting,
            clients_claim: options.clients_claim,
            cleanup_outdated_caches: options.cleanup_outdated_caches,
        },
        include_build_manifest: true,
        precache: precache_manifest(options, routes),
        rules,
    };
    rule_set.validate()?;

    tracing::debug!(
        rules = rule_set.rules.len(),
        precache = rule_set.precache.len(),
        preset = use_preset,
        "assembled rule set"
    );
    Ok(rule_set)
}

/// Rules that write the same partition with different bounds.
pub fn cache_name_conflicts(rule_set: &RuleSet) -> Vec<CacheNameConflict> {
    let mut seen: Vec<(&str, usize, Option<Expiration>)> = Vec::new();
    let mut conflicts = Vec::new();

    for (index, rule) in rule_set.rules.iter().enumerate() {
        let Some(name) = rule.partition() else {
            continue;
        };
        let expiration = rule.effective_expiration();
        match seen.iter().find(|(seen_name, _, _)| *seen_name == name) {
            Some((_, first, first_expiration)) => {
                if *first_expiration != expiration {
                    conflicts.push(CacheNameConflict {
                        cache_name: name.to_string(),
                        first_rule: *first,
                        second_rule: index,
                    });
                }
            }
            None => seen.push((name, index, expiration)),
        }
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BackgroundSyncOptions, BackgroundSyncQueueOptions, RuntimeCachingOptions, UrlPattern,
    };
    use swpolicy_rules::RuleError;

    fn routes(paths: &[&str]) -> Vec<Route> {
        paths.iter().map(|p| Route::new(*p)).collect()
    }

    fn origins(rule_set: &RuleSet) -> Vec<RuleOrigin> {
        rule_set.rules.iter().map(|r| r.origin).collect()
    }

    #[test]
    fn test_references_worker() {
        assert!(references_worker("/service-worker.js", "service-worker"));
        assert!(references_worker("/service-worker", "service-worker"));
        assert!(references_worker("/nested/service-worker.js?v=1", "service-worker"));
        assert!(!references_worker("/blog/service-workers-explained/", "service-worker"));
        assert!(!references_worker("/", "service-worker"));
    }

    #[test]
    fn test_precache_files_first_then_routes_deduped() {
        let options = ServiceWorkerOptions {
            precache_files: vec!["/offline".into(), "/".into(), "/service-worker.js".into()],
            ..ServiceWorkerOptions::default()
        };
        let manifest = precache_manifest(&options, &routes(&["/", "/about", "/service-worker.js"]));
        assert_eq!(manifest.urls(), vec!["/offline", "/", "/about"]);
        assert!(manifest.entries().iter().all(|e| e.revision.is_none()));
    }

    #[test]
    fn test_defaults_use_preset() {
        let rule_set = plan(&ServiceWorkerOptions::default(), &[]).unwrap();
        assert_eq!(
            origins(&rule_set),
            vec![
                RuleOrigin::StaticAssets,
                RuleOrigin::Preset,
                RuleOrigin::Preset,
                RuleOrigin::Preset,
                RuleOrigin::Preset,
                RuleOrigin::Preset,
            ]
        );
        let names = rule_set.declared_cache_names();
        assert_eq!(
            names,
            vec!["astro-static-assets", "static-resources", "api-cache", "images", "asset-cache"]
        );
    }

    #[test]
    fn test_auto_preset_off_with_custom_rules() {
        let options = ServiceWorkerOptions {
            api_cache_patterns: vec!["/api/".into()],
            ..ServiceWorkerOptions::default()
        };
        let rule_set = plan(&options, &[]).unwrap();
        assert_eq!(origins(&rule_set), vec![RuleOrigin::StaticAssets, RuleOrigin::ApiCache]);
    }

    #[test]
    fn test_recommended_preset_precedes_runtime_entries() {
        let options = ServiceWorkerOptions {
            preset: Preset::Recommended,
            runtime_caching: vec![RuntimeCachingEntry {
                url_pattern: UrlPattern::Regex("\\.woff2$".into()),
                handler: "CacheFirst".into(),
                options: RuntimeCachingOptions::default(),
            }],
            ..ServiceWorkerOptions::default()
        };
        let rule_set = plan(&options, &[]).unwrap();
        assert_eq!(rule_set.rules.len(), 7);
        assert_eq!(rule_set.rules[5].origin, RuleOrigin::Preset);
        assert_eq!(rule_set.rules[6].origin, RuleOrigin::RuntimeCaching);
    }

    #[test]
    fn test_rule_order_across_sources() {
        let mut caching_strategies = indexmap::IndexMap::new();
        caching_strategies.insert("fonts".to_string(), "CacheFirst".to_string());
        let options = ServiceWorkerOptions {
            api_cache_patterns: vec!["/api/".into(), "/graphql".into()],
            caching_strategies,
            runtime_caching: vec![RuntimeCachingEntry {
                url_pattern: UrlPattern::Regex("cdn".into()),
                handler: "StaleWhileRevalidate".into(),
                options: RuntimeCachingOptions::default(),
            }],
            background_sync: Some(BackgroundSyncOptions {
                name: "q".into(),
                options: BackgroundSyncQueueOptions { max_retention_time: 60 },
            }),
            ..ServiceWorkerOptions::default()
        };
        let rule_set = plan(&options, &[]).unwrap();
        assert_eq!(
            origins(&rule_set),
            vec![
                RuleOrigin::StaticAssets,
                RuleOrigin::ApiCache,
                RuleOrigin::ApiCache,
                RuleOrigin::CachingStrategy,
                RuleOrigin::RuntimeCaching,
                RuleOrigin::BackgroundSync,
            ]
        );
        assert_eq!(rule_set.rules[1].matcher, Matcher::path_pattern("^/api/"));
        assert_eq!(rule_set.rules[3].cache_name.as_deref(), Some("astro-fonts"));
        assert_eq!(rule_set.rules[3].expiration, None);
        assert_eq!(
            rule_set.rules[4].expiration,
            Some(Expiration::new(Some(50), Some(86400)))
        );
        assert_eq!(rule_set.rules[4].cache_name.as_deref(), Some("astro-runtime"));
        assert_eq!(rule_set.rules[5].replay_queue, Some(ReplayQueue::new("q", 60)));
    }

    #[test]
    fn test_runtime_defaults_fill_per_axis() {
        let options = ServiceWorkerOptions {
            runtime_caching: vec![RuntimeCachingEntry {
                url_pattern: UrlPattern::Regex("x".into()),
                handler: "CacheFirst".into(),
                options: RuntimeCachingOptions {
                    expiration: Some(Expiration::new(Some(5), None)),
                    ..RuntimeCachingOptions::default()
                },
            }],
            ..ServiceWorkerOptions::default()
        };
        let rule_set = plan(&options, &[]).unwrap();
        assert_eq!(rule_set.rules[1].expiration, Some(Expiration::new(Some(5), Some(86400))));
    }

    #[test]
    fn test_unknown_strategy_is_compile_error() {
        let mut caching_strategies = indexmap::IndexMap::new();
        caching_strategies.insert("x".to_string(), "CacheLast".to_string());
        let options = ServiceWorkerOptions {
            caching_strategies,
            ..ServiceWorkerOptions::default()
        };
        let err = plan(&options, &[]).unwrap_err();
        assert!(matches!(err, CompileError::Rule(RuleError::UnknownStrategy(_))));
    }

    #[test]
    fn test_invalid_regex_is_compile_error() {
        let options = ServiceWorkerOptions {
            api_cache_patterns: vec!["(".into()],
            ..ServiceWorkerOptions::default()
        };
        let err = plan(&options, &[]).unwrap_err();
        assert!(matches!(err, CompileError::Rule(RuleError::InvalidPattern { .. })));
    }

    #[test]
    fn test_cache_name_conflict_detected() {
        let options = ServiceWorkerOptions {
            runtime_caching: vec![
                RuntimeCachingEntry {
                    url_pattern: UrlPattern::Regex("a".into()),
                    handler: "CacheFirst".into(),
                    options: RuntimeCachingOptions {
                        cache_name: Some("shared".into()),
                        ..RuntimeCachingOptions::default()
                    },
                },
                RuntimeCachingEntry {
                    url_pattern: UrlPattern::Regex("b".into()),
                    handler: "CacheFirst".into(),
                    options: RuntimeCachingOptions {
                        cache_name: Some("shared".into()),
                        expiration: Some(Expiration::new(Some(1), Some(1))),
                        ..RuntimeCachingOptions::default()
                    },
                },
            ],
            ..ServiceWorkerOptions::default()
        };
        let rule_set = plan(&options, &[]).unwrap();
        let conflicts = cache_name_conflicts(&rule_set);
        assert_eq!(
            conflicts,
            vec![CacheNameConflict {
                cache_name: "shared".into(),
                first_rule: 1,
                second_rule: 2,
            }]
        );
    }

    #[test]
    fn test_shared_api_cache_is_not_a_conflict() {
        let options = ServiceWorkerOptions {
            api_cache_patterns: vec!["/api/".into(), "/v2/".into()],
            ..ServiceWorkerOptions::default()
        };
        let rule_set = plan(&options, &[]).unwrap();
        assert!(cache_name_conflicts(&rule_set).is_empty());
    }

    #[test]
    fn test_input_options_not_mutated() {
        let options = ServiceWorkerOptions::default();
        let before = options.clone();
        plan(&options, &routes(&["/"])).unwrap();
        assert_eq!(options, before);
    }
}
