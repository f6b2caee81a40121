//! Program text emission.
//!
//! The output is a classic worker script for Workbox. Matchers are embedded
//! as JSON descriptors and evaluated by `matchRequest`, which mirrors
//! `swpolicy_rules::CompiledMatcher`.

use swpolicy_rules::{CachingRule, RuleSet};

use super::CompileError;
use crate::assets::MANIFEST_PLACEHOLDER;
use crate::config::ServiceWorkerOptions;

const MATCH_REQUEST: &str = r#"function matchRequest(matcher) {
  switch (matcher.type) {
    case 'destination':
      return ({ request }) => matcher.destinations.includes(request.destination);
    case 'path_prefix':
      return ({ url }) => url.pathname.startsWith(matcher.prefix);
    case 'method':
      return ({ request }) => request.method === matcher.method;
    case 'extensions':
      return ({ request }) => matcher.extensions.some((ext) => request.url.endsWith(ext));
    case 'pattern': {
      const re = new RegExp(matcher.pattern);
      return matcher.target === 'path'
        ? ({ url }) => re.test(url.pathname)
        : ({ url }) => re.test(url.href);
    }
    default:
      return () => false;
  }
}
"#;

const SKIP_WAITING_LISTENER: &str = r#"self.addEventListener('message', (event) => {
  if (event.data && event.data.type === 'SKIP_WAITING') {
    self.skipWaiting();
  }
});
"#;

/// Deletes caches outside `DECLARED_CACHES`, including ones opened by custom code.
const CLEANUP_LISTENER: &str = r#"self.addEventListener('activate', (event) => {
  event.waitUntil(
    caches.keys().then((names) =>
      Promise.all(
        names
          .filter((name) => !name.startsWith('workbox-precache') && !DECLARED_CACHES.includes(name))
          .map((name) => caches.delete(name))
      )
    )
  );
});
"#;

/// JS string literal for `s`.
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Emit the worker program for `rule_set`.
///
/// The output depends only on its inputs; equal inputs give identical text.
pub fn emit(
    options: &ServiceWorkerOptions,
    rule_set: &RuleSet,
    fingerprint: &str,
) -> Result<String, CompileError> {
    let mut out = String::new();

    out.push_str(&format!("// swpolicy config {}\n", fingerprint));
    out.push_str(&format!("importScripts({});\n\n", js_string(&options.workbox_url)));
    out.push_str(&format!(
        "workbox.setConfig({{\n  debug: {}\n}});\n\n",
        options.debug
    ));
    out.push_str(MATCH_REQUEST);
    out.push('\n');

    out.push_str(SKIP_WAITING_LISTENER);
    out.push('\n');
    emit_lifecycle(&mut out, rule_set)?;

    if rule_set.include_build_manifest {
        out.push_str(&format!(
            "workbox.precaching.precacheAndRoute({});\n\n",
            MANIFEST_PLACEHOLDER
        ));
    }
    let urls = serde_json::to_string(&rule_set.precache.urls())?;
    out.push_str(&format!(
        "workbox.precaching.precacheAndRoute({}.map((url) => ({{ url, revision: null }})));\n",
        urls
    ));

    let mut queues = ReplayPlugins::default();
    for (index, rule) in rule_set.rules.iter().enumerate() {
        out.push('\n');
        emit_rule(&mut out, index, rule, &mut queues)?;
    }

    Ok(out)
}

fn emit_lifecycle(out: &mut String, rule_set: &RuleSet) -> Result<(), CompileError> {
    let lifecycle = &rule_set.lifecycle;
    if lifecycle.skip_waiting {
        out.push_str("self.addEventListener('install', () => self.skipWaiting());\n");
    }
    if lifecycle.clients_claim {
        out.push_str("workbox.core.clientsClaim();\n");
    }
    if lifecycle.cleanup_outdated_caches {
        out.push_str("workbox.precaching.cleanupOutdatedCaches();\n\n");
        let declared = serde_json::to_string(&rule_set.declared_cache_names())?;
        out.push_str(&format!("const DECLARED_CACHES = {};\n", declared));
        out.push_str(CLEANUP_LISTENER);
    }
    out.push('\n');
    Ok(())
}

/// Replay plugin constants already declared, by queue name.
///
/// Workbox rejects a second queue with the same name, so rules sharing a
/// queue share one plugin.
#[derive(Default)]
struct ReplayPlugins {
    declared: Vec<(String, String)>,
}

impl ReplayPlugins {
    fn get(&self, queue: &str) -> Option<&str> {
        self.declared
            .iter()
            .find(|(name, _)| name == queue)
            .map(|(_, ident)| ident.as_str())
    }
}

fn emit_rule(
    out: &mut String,
    index: usize,
    rule: &CachingRule,
    queues: &mut ReplayPlugins,
) -> Result<(), CompileError> {
    let mut plugins = Vec::new();

    if let Some(expiration) = rule.effective_expiration() {
        let mut fields = Vec::new();
        if let Some(max_entries) = expiration.max_entries {
            fields.push(format!("        maxEntries: {},\n", max_entries));
        }
        if let Some(max_age) = expiration.max_age_seconds {
            fields.push(format!("        maxAgeSeconds: {},\n", max_age));
        }
        plugins.push(format!(
            "      new workbox.expiration.ExpirationPlugin({{\n{}      }}),\n",
            fields.concat()
        ));
    }

    if let Some(queue) = &rule.replay_queue {
        let plugin = match queues.get(&queue.name) {
            Some(existing) => existing.to_string(),
            None => {
                let plugin = format!("replayQueue{}", index);
                out.push_str(&format!(
                    "const {} = new workbox.backgroundSync.BackgroundSyncPlugin({}, {{\n",
                    plugin,
                    js_string(&queue.name)
                ));
                out.push_str(&format!(
                    "  maxRetentionTime: {} * 60\n}});\n\n",
                    queue.max_retention_minutes
                ));
                queues.declared.push((queue.name.clone(), plugin.clone()));
                plugin
            }
        };
        plugins.push(format!("      {},\n", plugin));
    }

    let mut strategy_options = String::new();
    if let Some(cache_name) = rule.partition() {
        strategy_options.push_str(&format!("    cacheName: {},\n", js_string(cache_name)));
    }
    if let Some(timeout) = rule.network_timeout_seconds {
        strategy_options.push_str(&format!("    networkTimeoutSeconds: {},\n", timeout));
    }
    if !plugins.is_empty() {
        strategy_options.push_str(&format!("    plugins: [\n{}    ],\n", plugins.concat()));
    }

    let matcher = serde_json::to_string(&rule.matcher)?;
    out.push_str(&format!("// {} rule {}\n", rule.origin.as_str(), index));
    out.push_str("workbox.routing.registerRoute(\n");
    out.push_str(&format!("  matchRequest({}),\n", matcher));
    if strategy_options.is_empty() {
        out.push_str(&format!("  new workbox.strategies.{}()", rule.strategy));
    } else {
        out.push_str(&format!(
            "  new workbox.strategies.{}({{\n{}  }})",
            rule.strategy, strategy_options
        ));
    }

    let method = rule.route_method();
    if method != "GET" {
        out.push_str(&format!(",\n  {}", js_string(method)));
    }
    out.push_str("\n);\n");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swpolicy_rules::{Expiration, Matcher, ReplayQueue, RuleOrigin, Strategy};

    fn replay_rule(queue: &str, minutes: u64) -> CachingRule {
        CachingRule::new(
            RuleOrigin::BackgroundSync,
            Matcher::method("POST"),
            Strategy::NetworkOnly,
        )
        .with_replay_queue(ReplayQueue::new(queue, minutes))
    }

    fn render(rule: CachingRule) -> String {
        let mut out = String::new();
        emit_rule(&mut out, 3, &rule, &mut ReplayPlugins::default()).unwrap();
        out
    }

    #[test]
    fn test_network_first_rule_text() {
        let rule = CachingRule::new(
            RuleOrigin::ApiCache,
            Matcher::path_pattern("^/api/"),
            Strategy::NetworkFirst,
        )
        .with_cache_name("test-api")
        .with_expiration(Expiration::new(Some(50), Some(300)));

        let expected = r#"// api_cache rule 3
workbox.routing.registerRoute(
  matchRequest({"type":"pattern","pattern":"^/api/","target":"path"}),
  new workbox.strategies.NetworkFirst({
    cacheName: "test-api",
    plugins: [
      new workbox.expiration.ExpirationPlugin({
        maxEntries: 50,
        maxAgeSeconds: 300,
      }),
    ],
  })
);
"#;
        assert_eq!(render(rule), expected);
    }

    #[test]
    fn test_replay_rule_registers_for_post() {
        let text = render(replay_rule("q", 60));

        assert!(text.starts_with(concat!(
            "const replayQueue3 = new workbox.backgroundSync.BackgroundSyncPlugin(\"q\", {\n",
            "  maxRetentionTime: 60 * 60\n",
            "});"
        )));
        assert!(text.contains(concat!(
            "new workbox.strategies.NetworkOnly({\n",
            "    plugins: [\n",
            "      replayQueue3,\n",
            "    ],\n",
            "  })"
        )));
        assert!(text.ends_with(",\n  \"POST\"\n);\n"));
        assert!(!text.contains("cacheName"));
    }

    #[test]
    fn test_shared_queue_declares_one_plugin() {
        let mut out = String::new();
        let mut queues = ReplayPlugins::default();
        emit_rule(&mut out, 2, &replay_rule("shared", 60), &mut queues).unwrap();
        emit_rule(&mut out, 5, &replay_rule("shared", 60), &mut queues).unwrap();

        assert_eq!(out.matches("BackgroundSyncPlugin(\"shared\"").count(), 1);
        assert!(!out.contains("replayQueue5"));
        assert_eq!(out.matches("      replayQueue2,\n").count(), 2);
    }

    #[test]
    fn test_zero_bounds_are_not_emitted() {
        let rule = CachingRule::new(
            RuleOrigin::RuntimeCaching,
            Matcher::url_pattern("x"),
            Strategy::CacheFirst,
        )
        .with_cache_name("c");

        let text = render(rule.clone().with_expiration(Expiration::new(Some(0), Some(60))));
        assert!(!text.contains("maxEntries"));
        assert!(text.contains("maxAgeSeconds: 60,"));

        let text = render(rule.with_expiration(Expiration::new(Some(0), Some(0))));
        assert!(!text.contains("ExpirationPlugin"));
    }

    #[test]
    fn test_bare_rule_without_options() {
        let rule = CachingRule::new(
            RuleOrigin::CachingStrategy,
            Matcher::url_pattern("x"),
            Strategy::NetworkOnly,
        );
        assert!(render(rule).contains("  new workbox.strategies.NetworkOnly()\n);"));
    }

    #[test]
    fn test_pattern_is_escaped() {
        let rule = CachingRule::new(
            RuleOrigin::CachingStrategy,
            Matcher::url_pattern("it's\\.png$"),
            Strategy::CacheFirst,
        )
        .with_cache_name("astro-it's");
        let text = render(rule);
        assert!(text.contains(r#""pattern":"it's\\.png$""#));
        assert!(text.contains(r#"cacheName: "astro-it's""#));
    }

    #[test]
    fn test_js_string() {
        assert_eq!(js_string("a\"b\n"), r#""a\"b\n""#);
    }
}
