//! Locating the Android SDK and its command-line tools on disk.
//!
//! Resolution order for the SDK root: an explicit hint (an invalid hint is an
//! error, because the caller asked for that specific directory), then the
//! `ANDROID_HOME` / `ANDROID_SDK_ROOT` environment variables, then the
//! platform's well-known install locations.

use std::env;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::android::AndroidError;
use crate::version::Version;

const SDK_ENV_VARS: [&str; 2] = ["ANDROID_HOME", "ANDROID_SDK_ROOT"];

/// Resolves the SDK root directory.
pub fn find_sdk_root(hint: Option<&Path>) -> Result<PathBuf, AndroidError> {
    if let Some(hint) = hint {
        if hint.is_dir() {
            return Ok(hint.to_path_buf());
        }
        return Err(AndroidError::InvalidSdkRoot {
            path: hint.to_path_buf(),
        });
    }

    for var in SDK_ENV_VARS {
        let Ok(value) = env::var(var) else { continue };
        if value.trim().is_empty() {
            continue;
        }
        let root = PathBuf::from(value);
        if root.is_dir() {
            debug!(var, root = %root.display(), "resolved sdk root from environment");
            return Ok(root);
        }
        warn!(var, root = %root.display(), "environment variable points at a missing directory");
    }

    for root in well_known_roots() {
        if root.is_dir() {
            debug!(root = %root.display(), "resolved sdk root from a well-known location");
            return Ok(root);
        }
    }

    Err(AndroidError::SdkRootNotFound)
}

/// Resolves a tool beneath the SDK root, probing `.exe`/`.bat` siblings.
pub fn find_tool(sdk_root: &Path, tool: &str) -> Option<PathBuf> {
    find_fuzzy(&sdk_root.join(tool))
}

/// Resolves a tool under the newest `build-tools/<version>/` directory that
/// actually contains it.
pub fn find_build_tool(sdk_root: &Path, tool: &str) -> Option<PathBuf> {
    let build_tools = sdk_root.join("build-tools");
    let entries = std::fs::read_dir(&build_tools).ok()?;

    let mut newest: Option<(Version, PathBuf)> = None;
    for entry in entries.flatten() {
        let dir = entry.path();
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Ok(version) = name.parse::<Version>() else {
            debug!(name, "skipping build-tools entry with a non-version name");
            continue;
        };
        if newest.as_ref().is_some_and(|(best, _)| *best >= version) {
            continue;
        }
        if let Some(path) = find_fuzzy(&dir.join(tool)) {
            newest = Some((version, path));
        }
    }

    let (version, path) = newest?;
    debug!(%version, path = %path.display(), "resolved build tool");
    Some(path)
}

fn well_known_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(home) = dirs::home_dir() {
        roots.push(home.join("Android").join("Sdk"));
        roots.push(home.join("Library").join("Android").join("sdk"));
    }
    if let Some(data) = dirs::data_local_dir() {
        roots.push(data.join("Android").join("Sdk"));
    }
    roots
}

fn find_fuzzy(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    for candidate in [path.with_extension("exe"), path.with_extension("bat")] {
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
