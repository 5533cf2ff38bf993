//! Network namespace entry.
//!
//! Runs a closure with the calling thread switched into another network
//! namespace and switches it back afterwards. Only the calling thread
//! changes namespace, so callers that need isolation run this on a
//! dedicated thread.

use std::path::{Path, PathBuf};

use rootnet_common::error::{Result, RootnetError};

/// Returns the `/proc` path of the network namespace of `pid`.
#[must_use]
pub fn netns_path_for_pid(pid: u32) -> PathBuf {
    PathBuf::from(format!("/proc/{pid}/ns/net"))
}

/// Runs `f` inside the network namespace at `path`.
///
/// The calling thread joins the namespace for the duration of `f` and
/// returns to its original namespace before this function returns.
///
/// # Errors
///
/// Returns an error if either namespace file cannot be opened, if joining
/// the target namespace fails, or if restoring the original one fails.
#[cfg(target_os = "linux")]
pub fn with_netns_path<T>(path: &Path, f: impl FnOnce() -> T) -> Result<T> {
    use std::fs::File;

    use nix::sched::{CloneFlags, setns};

    let open = |p: &Path| {
        File::open(p).map_err(|e| RootnetError::Io {
            path: p.to_path_buf(),
            source: e,
        })
    };
    let original = open(Path::new("/proc/thread-self/ns/net"))?;
    let target = open(path)?;

    setns(&target, CloneFlags::CLONE_NEWNET).map_err(|e| RootnetError::PermissionDenied {
        message: format!("joining network namespace {}: {e}", path.display()),
    })?;
    tracing::trace!(netns = %path.display(), "entered network namespace");

    let out = f();

    if let Err(e) = setns(&original, CloneFlags::CLONE_NEWNET) {
        tracing::error!(netns = %path.display(), error = %e, "failed to restore network namespace");
        return Err(RootnetError::syscall("setns(restore)", e));
    }
    Ok(out)
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; network namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn with_netns_path<T>(_path: &Path, _f: impl FnOnce() -> T) -> Result<T> {
    Err(RootnetError::Unsupported {
        feature: "network namespaces",
    })
}
