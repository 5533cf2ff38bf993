//! Unified error type for the rootnet workspace.
//!
//! Variants follow the failure classes of a network bootstrap: bad
//! configuration, an unusable environment, a helper that never became
//! ready, a helper that answered with an error, and low-level system call
//! failures. Best-effort failures are logged where they happen and never
//! surface here.

use std::net::Ipv4Addr;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum RootnetError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// An option was requested that the installed helper cannot honour.
    #[error("{feature} not supported")]
    Unsupported {
        /// Name of the unsupported option.
        feature: &'static str,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// Probing a helper binary for its capabilities failed.
    #[error("checking helper binary {binary}: {output:?}: {source}")]
    Probe {
        /// Helper binary that was probed.
        binary: PathBuf,
        /// Combined output captured from the probe.
        output: String,
        /// Underlying failure (spawn error or non-zero exit).
        source: std::io::Error,
    },

    /// A helper exited before signalling readiness.
    #[error("{program} failed: {detail:?}")]
    Startup {
        /// Program name of the helper.
        program: String,
        /// Log output captured from the helper.
        detail: String,
    },

    /// A helper was killed by a signal before signalling readiness.
    #[error("{program} killed by signal")]
    Killed {
        /// Program name of the helper.
        program: String,
    },

    /// A helper exited while it was still expected to serve requests.
    #[error("{program} exited with {status}")]
    HelperExited {
        /// Program name of the helper.
        program: String,
        /// Human-readable exit status.
        status: String,
    },

    /// Setup failed after a helper became ready. The helper keeps running
    /// until `exit_fd` is closed, so the caller's teardown can stop it.
    #[error("{program} (pid {pid}) left running after a failed setup")]
    HelperLeftRunning {
        /// Program name of the helper.
        program: String,
        /// Helper process ID.
        pid: u32,
        /// Write end of the helper's exit pipe.
        exit_fd: OwnedFd,
        /// Step that failed.
        source: Box<RootnetError>,
    },

    /// A helper reported a human-readable failure on its standard output.
    #[error("{program} {message}")]
    HelperMessage {
        /// Program name of the helper.
        program: String,
        /// Message printed by the helper, without the trailing newline.
        message: String,
    },

    /// A helper rejected a request or answered with garbage.
    #[error("{endpoint}: {message}")]
    Protocol {
        /// Socket the request was sent to.
        endpoint: PathBuf,
        /// Error detail reported by the far end.
        message: String,
    },

    /// A bounded wait elapsed.
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout {
        /// What was being waited for.
        what: String,
        /// How long the wait lasted.
        after: Duration,
    },

    /// Adding an offset to an address overflowed the IPv4 space.
    #[error("integer overflow while calculating ip address offset, {base} + {offset}")]
    AddressOverflow {
        /// Base address of the subnet.
        base: Ipv4Addr,
        /// Offset that was added.
        offset: u32,
    },

    /// A computed address fell outside the subnet it was derived from.
    #[error("calculated ip address {address} is not within given subnet {subnet}")]
    AddressOutsideSubnet {
        /// Computed address.
        address: Ipv4Addr,
        /// Subnet the address should belong to.
        subnet: String,
    },

    /// A system call failed.
    #[error("{op} failed: {source}")]
    Syscall {
        /// Operation that failed.
        op: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A permission or capability error.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl RootnetError {
    /// Shorthand for a [`RootnetError::Config`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The error that caused the failure, looking through
    /// [`RootnetError::HelperLeftRunning`].
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::HelperLeftRunning { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Wraps an OS error returned by `op`.
    pub fn syscall(op: &'static str, source: impl Into<std::io::Error>) -> Self {
        Self::Syscall {
            op,
            source: source.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RootnetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_reads_like_a_sentence() {
        let err = RootnetError::Unsupported { feature: "cidr" };
        assert_eq!(err.to_string(), "cidr not supported");
    }

    #[test]
    fn startup_error_quotes_the_log() {
        let err = RootnetError::Startup {
            program: "slirp4netns".into(),
            detail: "open(\"/dev/net/tun\"): No such file\n".into(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("slirp4netns failed: "));
        assert!(msg.contains("/dev/net/tun"));
    }

    #[test]
    fn left_running_exposes_the_failed_step() {
        let (end, _peer) = std::os::unix::net::UnixStream::pair().expect("socketpair");
        let err = RootnetError::HelperLeftRunning {
            program: "slirp4netns".into(),
            pid: 42,
            exit_fd: OwnedFd::from(end),
            source: Box::new(RootnetError::config("boom")),
        };
        assert_eq!(err.to_string(), "slirp4netns (pid 42) left running after a failed setup");
        assert!(matches!(err.root_cause(), RootnetError::Config { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn overflow_names_both_operands() {
        let err = RootnetError::AddressOverflow {
            base: Ipv4Addr::new(255, 255, 255, 0),
            offset: 300,
        };
        assert!(err.to_string().contains("255.255.255.0 + 300"));
    }
}
