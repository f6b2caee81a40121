//! Buildable routes.
//!
//! Routes come either from a JSON file written by the host build or from
//! the `.html` files found in the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Route {
    pub pathname: String,
}

impl Route {
    pub fn new(pathname: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid route file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to walk output directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Either `{"pathname": "/a"}` or a bare `"/a"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RouteEntry {
    Object(Route),
    Path(String),
}

/// Load routes from a JSON array, keeping file order.
pub fn load_routes(path: &Path) -> Result<Vec<Route>, RouteError> {
    let contents = fs::read_to_string(path).map_err(|source| RouteError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: Vec<RouteEntry> =
        serde_json::from_str(&contents).map_err(|source| RouteError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            RouteEntry::Object(route) => route,
            RouteEntry::Path(pathname) => Route::new(pathname),
        })
        .collect())
}

/// Derive routes from the HTML pages under `out_dir`, sorted by pathname.
pub fn enumerate_routes(out_dir: &Path) -> Result<Vec<Route>, RouteError> {
    let mut routes = Vec::new();

    for entry in WalkDir::new(out_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(out_dir) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if let Some(pathname) = html_pathname(&rel) {
            routes.push(Route::new(pathname));
        }
    }

    routes.sort();
    routes.dedup();
    Ok(routes)
}

fn html_pathname(rel: &str) -> Option<String> {
    if rel == "index.html" {
        return Some("/".to_string());
    }
    if let Some(dir) = rel.strip_suffix("/index.html") {
        return Some(format!("/{}/", dir));
    }
    rel.strip_suffix(".html").map(|page| format!("/{}", page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "<html></html>").unwrap();
    }

    #[test]
    fn test_html_pathname() {
        assert_eq!(html_pathname("index.html").as_deref(), Some("/"));
        assert_eq!(html_pathname("about/index.html").as_deref(), Some("/about/"));
        assert_eq!(html_pathname("404.html").as_deref(), Some("/404"));
        assert_eq!(html_pathname("app.js"), None);
    }

    #[test]
    fn test_enumerate_routes_sorted() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "index.html");
        touch(dir.path(), "blog/first-post/index.html");
        touch(dir.path(), "about.html");
        touch(dir.path(), "_astro/app.js");

        let routes = enumerate_routes(dir.path()).unwrap();
        let paths: Vec<&str> = routes.iter().map(|r| r.pathname.as_str()).collect();
        assert_eq!(paths, vec!["/", "/about", "/blog/first-post/"]);
    }

    #[test]
    fn test_load_routes_both_forms() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("routes.json");
        fs::write(&path, r#"[{"pathname": "/"}, "/about"]"#).unwrap();

        let routes = load_routes(&path).unwrap();
        assert_eq!(routes, vec![Route::new("/"), Route::new("/about")]);
    }

    #[test]
    fn test_load_routes_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("routes.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(load_routes(&path), Err(RouteError::Parse { .. })));
    }
}
