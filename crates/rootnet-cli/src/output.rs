//! Formatted output helpers for CLI commands.
//!
//! Provides the capability table printed by `probe` and the summary
//! printed once `setup` has brought the helpers up.

use std::fmt::Write;

use rootnet_core::addr;
use rootnet_runtime::slirp::{PortForward, SlirpFeatures, SlirpNetwork};

/// ANSI green.
pub const GREEN: &str = "\x1b[32m";
/// ANSI dim.
pub const DIM: &str = "\x1b[2m";
/// ANSI bold.
pub const BOLD: &str = "\x1b[1m";
/// ANSI reset.
pub const RESET: &str = "\x1b[0m";

/// Renders one `flag  yes|no` row per optional slirp4netns flag.
#[must_use]
pub fn feature_table(features: &SlirpFeatures) -> String {
    let rows = [
        ("--disable-host-loopback", features.disable_host_loopback),
        ("--mtu", features.mtu),
        ("--enable-sandbox", features.enable_sandbox),
        ("--enable-seccomp", features.enable_seccomp),
        ("--cidr", features.cidr),
        ("--outbound-addr", features.outbound_addr),
        ("--enable-ipv6", features.ipv6),
    ];
    let mut out = String::new();
    for (flag, supported) in rows {
        let _ = writeln!(out, "{flag:<26}{}", if supported { "yes" } else { "no" });
    }
    out
}

/// Summarizes a running slirp4netns network: subnet, guest address and
/// the port forwarding backend in use.
#[must_use]
pub fn network_summary(network: &SlirpNetwork) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  subnet    {}", network.subnet);
    if let Ok(guest) = addr::slirp_ip(Some(&network.subnet)) {
        let _ = writeln!(out, "  guest     {guest}");
    }
    match &network.port_forward {
        Some(PortForward::Slirp { api_socket }) => {
            let _ = writeln!(out, "  ports     slirp4netns api {}", api_socket.display());
        }
        Some(PortForward::Rootlessport(port)) => {
            let _ = writeln!(out, "  ports     rootlessport [pid {}]", port.pid);
        }
        None => {
            let _ = writeln!(out, "  ports     none");
        }
    }
    out
}
