//! End-to-end compile scenarios: options and routes in, program text out.

use serde_json::json;
use swpolicy::compiler::plan;
use swpolicy::config::ServiceWorkerOptions;
use swpolicy::{compile, CompileError, Route};

fn options(value: serde_json::Value) -> ServiceWorkerOptions {
    serde_json::from_value(value).unwrap()
}

fn routes(paths: &[&str]) -> Vec<Route> {
    paths.iter().map(|p| Route::new(*p)).collect()
}

/// The URL list passed to the unversioned precache call.
fn precache_list(program: &str) -> Vec<String> {
    let line = program
        .lines()
        .find(|l| l.ends_with(".map((url) => ({ url, revision: null })));"))
        .unwrap();
    let start = line.find('[').unwrap();
    let end = line.find(']').unwrap();
    serde_json::from_str(&line[start..=end]).unwrap()
}

/// Rule origins in emission order, from the `// <origin> rule <n>` headers.
fn rule_origins(program: &str) -> Vec<String> {
    program
        .lines()
        .filter_map(|l| l.strip_prefix("// "))
        .filter_map(|l| l.split_once(" rule "))
        .map(|(origin, _)| origin.to_string())
        .collect()
}

#[test]
fn test_api_pattern_scenario() {
    let opts = options(json!({"apiCachePatterns": ["/api/"], "cacheNamePrefix": "test"}));
    let program = compile(&opts, &routes(&["/", "/about"])).unwrap();

    assert!(program.contains(
        "  new workbox.strategies.NetworkFirst({\n    cacheName: \"test-api\",\n"
    ));
    assert!(program
        .contains(r#"matchRequest({"type":"pattern","pattern":"^/api/","target":"path"})"#));
    assert_eq!(precache_list(&program), vec!["/", "/about"]);
    // custom rules switch the automatic preset off
    assert_eq!(rule_origins(&program), vec!["static_assets", "api_cache"]);
}

#[test]
fn test_background_sync_scenario() {
    let opts = options(json!({
        "backgroundSync": {"name": "q", "options": {"maxRetentionTime": 60}}
    }));
    let program = compile(&opts, &[]).unwrap();

    assert!(program.contains(concat!(
        "replayQueue1 = new workbox.backgroundSync.BackgroundSyncPlugin(\"q\", {\n",
        "  maxRetentionTime: 60 * 60\n",
        "});"
    )));

    let rule = &program[program.find("// background_sync rule 1").unwrap()..];
    assert!(rule.contains(r#"matchRequest({"type":"method","method":"POST"})"#));
    assert!(rule.contains("      replayQueue1,\n"));
    assert!(rule.contains(",\n  \"POST\"\n);"));
}

#[test]
fn test_rule_order_follows_option_groups() {
    let opts = options(json!({
        "backgroundSync": {"name": "q"},
        "runtimeCaching": [{"urlPattern": "\\.woff2$", "handler": "CacheFirst"}],
        "cachingStrategies": {"\\.json$": "StaleWhileRevalidate"},
        "apiCachePatterns": ["/api/", "/graphql"],
        "preset": "recommended"
    }));
    let program = compile(&opts, &[]).unwrap();

    assert_eq!(
        rule_origins(&program),
        vec![
            "static_assets",
            "api_cache",
            "api_cache",
            "caching_strategy",
            "preset",
            "preset",
            "preset",
            "preset",
            "preset",
            "runtime_caching",
            "background_sync",
        ]
    );

    // precache registration comes before every runtime rule
    let precache = program.find("workbox.precaching.precacheAndRoute(").unwrap();
    let first_rule = program.find("workbox.routing.registerRoute(").unwrap();
    assert!(precache < first_rule);
}

#[test]
fn test_compile_is_deterministic() {
    let opts = options(json!({
        "apiCachePatterns": ["/api/"],
        "cachingStrategies": {"\\.png$": "CacheFirst", "\\.css$": "StaleWhileRevalidate"},
        "precacheFiles": ["/offline.html"]
    }));
    let r = routes(&["/b", "/a", "/"]);

    let first = compile(&opts, &r).unwrap();
    for _ in 0..5 {
        assert_eq!(compile(&opts, &r).unwrap(), first);
    }

    // route order is part of the input
    let reordered = compile(&opts, &routes(&["/", "/a", "/b"])).unwrap();
    assert_ne!(reordered, first);
}

#[test]
fn test_worker_never_precached() {
    let opts = options(json!({
        "swName": "sw.js",
        "precacheFiles": ["/sw.js", "/sw.js?v=2", "/assets/app.js", "/nested/sw.js"]
    }));
    let program = compile(&opts, &routes(&["/", "/sw.js", "/docs/"])).unwrap();

    assert_eq!(precache_list(&program), vec!["/assets/app.js", "/", "/docs/"]);
}

#[test]
fn test_shared_precache_entry_listed_once() {
    let opts = options(json!({"precacheFiles": ["/about", "/offline.html", "/about"]}));
    let program = compile(&opts, &routes(&["/", "/about"])).unwrap();

    assert_eq!(precache_list(&program), vec!["/about", "/offline.html", "/"]);
}

#[test]
fn test_default_options_use_recommended_rules() {
    let program = compile(&ServiceWorkerOptions::default(), &[]).unwrap();

    assert!(program.contains("cacheName: \"static-resources\""));
    assert!(program.contains("cacheName: \"images\""));
    assert!(program.contains("BackgroundSyncPlugin(\"astro-sync-queue\""));
    assert!(program.contains(
        concat!(
            r#"const DECLARED_CACHES = ["astro-static-assets","static-resources","#,
            r#""api-cache","images","asset-cache"];"#
        )
    ));
}

#[test]
fn test_unknown_handler_is_compile_error() {
    let opts = options(json!({"cachingStrategies": {"\\.png$": "CacheSometimes"}}));
    let err = compile(&opts, &[]).unwrap_err();
    assert!(matches!(err, CompileError::Rule(_)));
}

#[test]
fn test_invalid_pattern_is_compile_error() {
    let opts = options(json!({"runtimeCaching": [{"urlPattern": "([", "handler": "NetworkOnly"}]}));
    assert!(plan(&opts, &[]).is_err());
    assert!(compile(&opts, &[]).is_err());
}

#[test]
fn test_patterns_follow_browser_regexp_syntax() {
    let lookahead = options(json!({
        "cachingStrategies": {"^(?!.*/admin/).*\\.json$": "NetworkFirst"}
    }));
    assert!(compile(&lookahead, &[]).is_ok());

    let inline_flag = options(json!({"cachingStrategies": {"(?i)\\.png$": "CacheFirst"}}));
    let err = compile(&inline_flag, &[]).unwrap_err();
    assert!(matches!(err, CompileError::Rule(_)));
}

#[test]
fn test_shared_queue_name_declared_once() {
    let opts = options(json!({
        "preset": "recommended",
        "backgroundSync": {"name": "astro-sync-queue"}
    }));
    let program = compile(&opts, &[]).unwrap();

    assert_eq!(program.matches("BackgroundSyncPlugin(\"astro-sync-queue\"").count(), 1);
    let ident = program
        .lines()
        .find_map(|l| l.strip_prefix("const replayQueue"))
        .and_then(|l| l.split_once(' '))
        .map(|(n, _)| format!("      replayQueue{},\n", n))
        .unwrap();
    assert_eq!(program.matches(ident.as_str()).count(), 2);
}

#[test]
fn test_shared_queue_name_with_other_retention_is_error() {
    let opts = options(json!({
        "preset": "recommended",
        "backgroundSync": {"name": "astro-sync-queue", "options": {"maxRetentionTime": 5}}
    }));
    assert!(compile(&opts, &[]).is_err());
}
