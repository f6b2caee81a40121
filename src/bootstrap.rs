//! Page-side registration snippet.

/// Worker URL under the site base, e.g. `/docs/` + `sw.js` -> `/docs/sw.js`.
pub fn worker_url(base: &str, sw_name: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        format!("/{}", sw_name)
    } else if base.starts_with('/') {
        format!("{}/{}", base, sw_name)
    } else {
        format!("/{}/{}", base, sw_name)
    }
}

/// Inline script that registers the worker once the page has loaded.
///
/// Registration is attempted once; the outcome goes to the console.
pub fn registration_script(base: &str, sw_name: &str) -> String {
    let url = serde_json::Value::String(worker_url(base, sw_name)).to_string();
    format!(
        "if ('serviceWorker' in navigator) {{\n  \
window.addEventListener('load', () => {{\n    \
navigator.serviceWorker.register({url}).then((registration) => {{\n      \
console.log('Service Worker registered with scope:', registration.scope);\n    \
}}).catch((error) => {{\n      \
console.error('Service Worker registration failed:', error);\n    \
}});\n  \
}});\n\
}}\n"
    )
}
