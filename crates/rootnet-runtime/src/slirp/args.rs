//! slirp4netns command line construction.

use rootnet_common::constants::SLIRP4NETNS_MTU;
use rootnet_common::error::{Result, RootnetError};

use super::{NetworkOptions, SlirpFeatures};

/// Builds the option flags for `options`, emitting each optional flag only
/// when `features` reports support for it.
///
/// Flags come out in a fixed order: host loopback, MTU, sandbox, seccomp,
/// CIDR, IPv6, outbound IPv4, outbound IPv6.
///
/// # Errors
///
/// Returns [`RootnetError::Unsupported`] when an explicitly requested
/// option needs a flag the binary lacks, and [`RootnetError::Config`] when
/// `outbound_addr6` is set with IPv6 disabled.
pub fn build_args(options: &NetworkOptions, features: &SlirpFeatures) -> Result<Vec<String>> {
    let mut args = Vec::new();

    if options.disable_host_loopback && features.disable_host_loopback {
        args.push("--disable-host-loopback".to_string());
    }

    if features.mtu {
        args.push(format!("--mtu={}", options.mtu));
    } else if options.mtu != SLIRP4NETNS_MTU {
        return Err(RootnetError::Unsupported { feature: "mtu" });
    }

    if !options.no_pivot_root && features.enable_sandbox {
        args.push("--enable-sandbox".to_string());
    }
    if features.enable_seccomp {
        args.push("--enable-seccomp".to_string());
    }

    if let Some(cidr) = &options.cidr {
        if !features.cidr {
            return Err(RootnetError::Unsupported { feature: "cidr" });
        }
        args.push(format!("--cidr={cidr}"));
    }

    if options.enable_ipv6 {
        if !features.ipv6 {
            return Err(RootnetError::Unsupported {
                feature: "enable_ipv6",
            });
        }
        args.push("--enable-ipv6".to_string());
    }

    if let Some(addr) = &options.outbound_addr {
        if !features.outbound_addr {
            return Err(RootnetError::Unsupported {
                feature: "outbound_addr",
            });
        }
        args.push(format!("--outbound-addr={addr}"));
    }

    if let Some(addr6) = &options.outbound_addr6 {
        if !features.outbound_addr || !features.ipv6 {
            return Err(RootnetError::Unsupported {
                feature: "outbound_addr6",
            });
        }
        if !options.enable_ipv6 {
            return Err(RootnetError::config(
                "enable_ipv6=true is required for outbound_addr6",
            ));
        }
        args.push(format!("--outbound-addr6={addr6}"));
    }

    Ok(args)
}
