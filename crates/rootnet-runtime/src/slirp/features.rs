//! Capability detection for the installed slirp4netns.
//!
//! slirp4netns has no structured capability query, so the help text is
//! searched for each optional flag.

use std::path::Path;
use std::process::Command;

use rootnet_common::error::{Result, RootnetError};

/// Optional flags supported by a slirp4netns binary.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlirpFeatures {
    /// `--disable-host-loopback`
    pub disable_host_loopback: bool,
    /// `--mtu`
    pub mtu: bool,
    /// `--enable-sandbox`
    pub enable_sandbox: bool,
    /// `--enable-seccomp`
    pub enable_seccomp: bool,
    /// `--cidr`
    pub cidr: bool,
    /// `--outbound-addr` and `--outbound-addr6`
    pub outbound_addr: bool,
    /// `--enable-ipv6`
    pub ipv6: bool,
}

impl SlirpFeatures {
    /// Every optional flag supported.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            disable_host_loopback: true,
            mtu: true,
            enable_sandbox: true,
            enable_seccomp: true,
            cidr: true,
            outbound_addr: true,
            ipv6: true,
        }
    }

    /// Derives the feature set from slirp4netns `--help` output.
    #[must_use]
    pub fn from_help(help: &str) -> Self {
        Self {
            disable_host_loopback: help.contains("--disable-host-loopback"),
            mtu: help.contains("--mtu"),
            enable_sandbox: help.contains("--enable-sandbox"),
            enable_seccomp: help.contains("--enable-seccomp"),
            cidr: help.contains("--cidr"),
            outbound_addr: help.contains("--outbound-addr"),
            ipv6: help.contains("--enable-ipv6"),
        }
    }
}

/// Runs `binary --help` and derives its feature set.
///
/// # Errors
///
/// Returns [`RootnetError::Probe`] if the binary cannot be run or exits
/// unsuccessfully; the error carries whatever it printed.
pub fn probe(binary: &Path) -> Result<SlirpFeatures> {
    let output = Command::new(binary)
        .arg("--help")
        .output()
        .map_err(|e| RootnetError::Probe {
            binary: binary.to_path_buf(),
            output: String::new(),
            source: e,
        })?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(RootnetError::Probe {
            binary: binary.to_path_buf(),
            output: text,
            source: std::io::Error::other(output.status.to_string()),
        });
    }

    let features = SlirpFeatures::from_help(&text);
    tracing::debug!(binary = %binary.display(), ?features, "probed slirp4netns");
    Ok(features)
}
