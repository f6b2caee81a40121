//! The recommended five-category rule set.

use swpolicy_rules::{Destination, Expiration, Matcher, Strategy};

use crate::config::{
    BackgroundSyncOptions, BackgroundSyncQueueOptions, RuntimeCachingEntry, RuntimeCachingOptions,
    UrlPattern,
};

const DAY: u64 = 24 * 60 * 60;

fn entry(
    matcher: Matcher,
    strategy: Strategy,
    options: RuntimeCachingOptions,
) -> RuntimeCachingEntry {
    RuntimeCachingEntry {
        url_pattern: UrlPattern::Match(matcher),
        handler: strategy.as_str().to_string(),
        options,
    }
}

fn cached(name: &str, expiration: Expiration) -> RuntimeCachingOptions {
    RuntimeCachingOptions {
        cache_name: Some(name.to_string()),
        expiration: Some(expiration),
        ..RuntimeCachingOptions::default()
    }
}

/// Static resources, API, images, generic assets and POST replay.
///
/// Only the replay queue name depends on `cache_name_prefix`.
pub fn recommended(cache_name_prefix: &str) -> Vec<RuntimeCachingEntry> {
    vec![
        entry(
            Matcher::destinations(&[Destination::Style, Destination::Script, Destination::Worker]),
            Strategy::StaleWhileRevalidate,
            cached("static-resources", Expiration::new(None, Some(DAY))),
        ),
        entry(
            Matcher::path_prefix("/api/"),
            Strategy::NetworkFirst,
            RuntimeCachingOptions {
                network_timeout_seconds: Some(10),
                ..cached("api-cache", Expiration::new(Some(50), Some(5 * 60)))
            },
        ),
        entry(
            Matcher::destinations(&[Destination::Image]),
            Strategy::CacheFirst,
            cached("images", Expiration::new(Some(60), Some(30 * DAY))),
        ),
        entry(
            Matcher::path_prefix("/assets/"),
            Strategy::CacheFirst,
            cached("asset-cache", Expiration::new(Some(100), Some(30 * DAY))),
        ),
        entry(
            Matcher::method("POST"),
            Strategy::NetworkOnly,
            RuntimeCachingOptions {
                background_sync: Some(BackgroundSyncOptions {
                    name: format!("{}-sync-queue", cache_name_prefix),
                    options: BackgroundSyncQueueOptions {
                        max_retention_time: 24 * 60,
                    },
                }),
                ..RuntimeCachingOptions::default()
            },
        ),
    ]
}
