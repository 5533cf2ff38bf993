//! Helper binary discovery.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use rootnet_common::config::RuntimeConfig;
use rootnet_common::error::{Result, RootnetError};

/// Locates helper `name`.
///
/// Searches the configured helper directories in order, then `$PATH` when
/// `search_path` is set.
///
/// # Errors
///
/// Returns [`RootnetError::NotFound`] if no executable named `name` exists
/// in any searched location.
pub fn find_helper_binary(config: &RuntimeConfig, name: &str, search_path: bool) -> Result<PathBuf> {
    for dir in &config.helper_binaries_dir {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            tracing::debug!(binary = %candidate.display(), "found helper binary");
            return Ok(candidate);
        }
    }

    if search_path {
        if let Ok(found) = which::which(name) {
            tracing::debug!(binary = %found.display(), "found helper binary in PATH");
            return Ok(found);
        }
    }

    Err(RootnetError::NotFound {
        kind: "helper binary",
        id: name.to_string(),
    })
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}
