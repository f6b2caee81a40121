//! Build asset-hash manifest.
//!
//! Files under the output directory matching `globPatterns` are precached
//! with a content revision, replacing the manifest placeholder the compiler
//! leaves in the program.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use sha2::{Digest, Sha256};
use swpolicy_rules::{PrecacheEntry, PrecacheManifest};
use walkdir::WalkDir;

/// Expression the build replaces with the hashed asset list.
pub const MANIFEST_PLACEHOLDER: &str = "self.__WB_MANIFEST";

/// Hex characters kept from the SHA-256 of each file.
const REVISION_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("failed to walk output directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("program has no self.__WB_MANIFEST placeholder")]
    MissingPlaceholder,

    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AssetManifest {
    entries: Vec<PrecacheEntry>,
}

impl AssetManifest {
    /// Hash matching files under `out_dir`.
    ///
    /// The worker itself and URLs already in `explicit` are skipped, so a URL
    /// is never precached twice.
    pub fn scan(
        out_dir: &Path,
        glob_patterns: &[String],
        sw_name: &str,
        explicit: &PrecacheManifest,
    ) -> Result<Self, AssetError> {
        let globs = build_globset(glob_patterns)?;
        let mut entries = Vec::new();

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
            if rel == sw_name || !globs.is_match(&rel) {
                continue;
            }

            let url = format!("/{}", rel);
            if explicit.contains(&url) {
                continue;
            }

            let bytes = fs::read(entry.path()).map_err(|source| AssetError::Read {
                path: entry.path().to_path_buf(),
                source,
            })?;
            entries.push(PrecacheEntry {
                url,
                revision: Some(revision(&bytes)),
            });
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PrecacheEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the first placeholder in `program` with this manifest.
    pub fn substitute(&self, program: &str) -> Result<String, AssetError> {
        if !program.contains(MANIFEST_PLACEHOLDER) {
            return Err(AssetError::MissingPlaceholder);
        }
        let list = serde_json::to_string(&self.entries)?;
        Ok(program.replacen(MANIFEST_PLACEHOLDER, &list, 1))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, AssetError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn revision(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(REVISION_LEN);
    digest
}
