//! Helper log sinks.
//!
//! Each helper writes its diagnostics to a file under the runtime tmp dir
//! that is unlinked right after creation. The open descriptor keeps the
//! contents readable, so a failed start can be reported with the helper's
//! own output and nothing is left on disk afterwards.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use rootnet_common::error::{Result, RootnetError};
use rootnet_common::types::ContainerId;

/// Returns the log file path for a helper of a container.
#[must_use]
pub fn log_path(tmp_dir: &Path, helper: &str, container_id: &ContainerId) -> PathBuf {
    tmp_dir.join(format!("{helper}-{container_id}.log"))
}

/// Creates an empty log file for `helper` and removes it from the
/// directory, returning the open handle.
///
/// The handle is opened for reading and appending, so writers sharing it
/// never overwrite each other and it can be read back from the start.
///
/// # Errors
///
/// Returns an error if the tmp dir cannot be created, or the file cannot
/// be created, truncated or unlinked.
pub fn create_unlinked_log(tmp_dir: &Path, helper: &str, container_id: &ContainerId) -> Result<File> {
    std::fs::create_dir_all(tmp_dir).map_err(|e| RootnetError::Io {
        path: tmp_dir.to_path_buf(),
        source: e,
    })?;

    let path = log_path(tmp_dir, helper, container_id);
    let io_err = |e| RootnetError::Io {
        path: path.clone(),
        source: e,
    };
    let file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(&path)
        .map_err(io_err)?;
    file.set_len(0).map_err(io_err)?;
    std::fs::remove_file(&path).map_err(io_err)?;

    tracing::trace!(path = %path.display(), "created unlinked log file");
    Ok(file)
}
