//! User namespace detection.

/// Environment variable set by a runtime that re-executed itself inside a
/// user namespace it configured.
pub const USERNS_CONFIGURED_ENV: &str = "_CONTAINERS_USERNS_CONFIGURED";

/// Whether the process runs rootless.
///
/// True when the effective UID is not root, or when the process was
/// started inside a user namespace set up by a rootless runtime (where the
/// effective UID is 0 but maps to an unprivileged host user).
#[must_use]
pub fn is_rootless() -> bool {
    if std::env::var_os(USERNS_CONFIGURED_ENV).is_some_and(|v| !v.is_empty()) {
        return true;
    }
    !nix::unistd::geteuid().is_root()
}
