//! Custom code injection and worker persistence.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Marker placed between the generated program and appended custom code.
///
/// Custom code runs after the cleanup listener is registered. Activation
/// deletes every cache not named by a rule, so caches the custom code opens
/// survive an update only when a `runtimeCaching` entry declares the name.
pub const CUSTOM_CODE_SEPARATOR: &str = "\n\n// Custom worker code\n";

#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error("failed to read custom worker {path}: {source}")]
    ReadCustom { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Append `custom` to `program`. Composition is plain concatenation.
pub fn compose(program: &str, custom: Option<&str>) -> String {
    match custom {
        Some(custom) => format!("{}{}{}", program, CUSTOM_CODE_SEPARATOR, custom),
        None => program.to_string(),
    }
}

/// Build the final worker text and write it to `output_path`.
///
/// Any previous file at `output_path` is fully replaced.
pub fn inject(
    program: &str,
    output_path: &Path,
    custom_worker_path: Option<&Path>,
) -> Result<String, InjectError> {
    let custom = match custom_worker_path {
        Some(path) => Some(fs::read_to_string(path).map_err(|source| InjectError::ReadCustom {
            path: path.to_path_buf(),
            source,
        })?),
        None => None,
    };

    let final_text = compose(program, custom.as_deref());
    persist(output_path, &final_text)?;
    Ok(final_text)
}

/// Remove a file, treating "already gone" as success.
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Write through a sibling temp file, drop the old file, then rename.
pub(crate) fn persist(path: &Path, contents: &str) -> Result<(), InjectError> {
    let write_err = |source| InjectError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&temp_path, contents).map_err(write_err)?;
    remove_if_exists(path).map_err(write_err)?;
    fs::rename(&temp_path, path).map_err(write_err)?;
    Ok(())
}
