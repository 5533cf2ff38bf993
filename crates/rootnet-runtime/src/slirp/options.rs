//! `key=value` options for slirp4netns.
//!
//! Runtime-wide options are applied first and per-container options after
//! them, so a container can override any global setting.

use std::net::IpAddr;

use ipnet::Ipv4Net;
use rootnet_common::config::RuntimeConfig;
use rootnet_common::constants::{MIN_MTU, SLIRP4NETNS_MTU};
use rootnet_common::error::{Result, RootnetError};
use rootnet_core::addr;

/// Validated slirp4netns options for one container.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkOptions {
    /// IPv4 network handed to the container, as configured.
    pub cidr: Option<String>,
    /// Block connections to the host loopback.
    pub disable_host_loopback: bool,
    /// Give the container IPv6 connectivity.
    pub enable_ipv6: bool,
    /// Publish ports through the slirp4netns API instead of rootlessport.
    pub is_slirp_host_forward: bool,
    /// The runtime avoids `pivot_root`, so the helper sandbox is unusable.
    pub no_pivot_root: bool,
    /// MTU of the tap device.
    pub mtu: u32,
    /// IPv4 address or interface for outbound connections.
    pub outbound_addr: Option<String>,
    /// IPv6 address or interface for outbound connections.
    pub outbound_addr6: Option<String>,
}

impl NetworkOptions {
    /// Options used when nothing is configured.
    #[must_use]
    pub const fn defaults(config: &RuntimeConfig) -> Self {
        Self {
            cidr: None,
            disable_host_loopback: true,
            enable_ipv6: true,
            is_slirp_host_forward: false,
            no_pivot_root: config.no_pivot_root,
            mtu: SLIRP4NETNS_MTU,
            outbound_addr: None,
            outbound_addr6: None,
        }
    }

    /// Parses the runtime-wide options followed by `extra`.
    ///
    /// # Errors
    ///
    /// Returns [`RootnetError::Config`] for the first entry that has no
    /// `=`, names an unknown key or carries an invalid value.
    pub fn parse(config: &RuntimeConfig, extra: &[String]) -> Result<Self> {
        let mut opts = Self::defaults(config);
        for entry in config.network_cmd_options.iter().chain(extra) {
            opts.apply(entry)?;
        }
        tracing::debug!(options = ?opts, "parsed slirp4netns options");
        Ok(opts)
    }

    fn apply(&mut self, entry: &str) -> Result<()> {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(RootnetError::config(format!(
                "unknown option for slirp4netns: {entry:?}"
            )));
        };
        match key {
            "cidr" => {
                let _ = addr::parse_ipv4_cidr(value)
                    .map_err(|_| RootnetError::config(format!("invalid cidr {value:?}")))?;
                self.cidr = Some(value.to_string());
            }
            "port_handler" => {
                self.is_slirp_host_forward = match value {
                    "slirp4netns" => true,
                    "rootlesskit" => false,
                    _ => {
                        return Err(RootnetError::config(format!(
                            "unknown port_handler for slirp4netns: {value:?}"
                        )));
                    }
                };
            }
            "allow_host_loopback" => self.disable_host_loopback = !parse_bool(key, value)?,
            "enable_ipv6" => self.enable_ipv6 = parse_bool(key, value)?,
            "outbound_addr" => {
                let is_v4 = matches!(ip_literal(value), Some(IpAddr::V4(_)));
                if !is_v4 && !interface_exists(value) {
                    return Err(RootnetError::config(format!("invalid outbound_addr {value:?}")));
                }
                self.outbound_addr = Some(value.to_string());
            }
            "outbound_addr6" => {
                let is_v6 = matches!(ip_literal(value), Some(IpAddr::V6(_)));
                if !is_v6 && !interface_exists(value) {
                    return Err(RootnetError::config(format!("invalid outbound_addr6: {value:?}")));
                }
                self.outbound_addr6 = Some(value.to_string());
            }
            "mtu" => {
                self.mtu = value
                    .parse::<u32>()
                    .ok()
                    .filter(|mtu| *mtu >= MIN_MTU)
                    .ok_or_else(|| RootnetError::config(format!("invalid mtu {value:?}")))?;
            }
            _ => {
                return Err(RootnetError::config(format!(
                    "unknown option for slirp4netns: {entry:?}"
                )));
            }
        }
        Ok(())
    }

    /// Effective IPv4 subnet: the configured `cidr` or `10.0.2.0/24`.
    ///
    /// # Errors
    ///
    /// Returns [`RootnetError::Config`] if `cidr` is not an IPv4 CIDR.
    pub fn subnet(&self) -> Result<Ipv4Net> {
        self.cidr
            .as_deref()
            .map_or_else(|| Ok(addr::default_subnet()), addr::parse_ipv4_cidr)
    }
}

/// Parses an address literal, classifying IPv4-mapped IPv6 as IPv4.
fn ip_literal(value: &str) -> Option<IpAddr> {
    match value.parse::<IpAddr>().ok()? {
        IpAddr::V6(v6) => Some(v6.to_ipv4_mapped().map_or(IpAddr::V6(v6), IpAddr::V4)),
        v4 => Some(v4),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(RootnetError::config(format!(
            "invalid value of {key} for slirp4netns: {value:?}"
        ))),
    }
}

fn interface_exists(name: &str) -> bool {
    nix::net::if_::if_nametoindex(name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(entries: &[&str]) -> Result<NetworkOptions> {
        let extra: Vec<String> = entries.iter().map(ToString::to_string).collect();
        NetworkOptions::parse(&RuntimeConfig::default(), &extra)
    }

    #[test]
    fn defaults_apply_when_empty() {
        let opts = parse(&[]).unwrap();
        assert!(opts.disable_host_loopback);
        assert!(opts.enable_ipv6);
        assert!(!opts.is_slirp_host_forward);
        assert_eq!(opts.mtu, SLIRP4NETNS_MTU);
        assert!(opts.cidr.is_none());
    }

    #[test]
    fn no_pivot_root_comes_from_config() {
        let config = RuntimeConfig {
            no_pivot_root: true,
            ..RuntimeConfig::default()
        };
        assert!(NetworkOptions::parse(&config, &[]).unwrap().no_pivot_root);
    }

    #[test]
    fn known_keys_are_applied() {
        let opts = parse(&[
            "cidr=10.0.3.0/24",
            "port_handler=slirp4netns",
            "allow_host_loopback=true",
            "enable_ipv6=false",
            "outbound_addr=192.0.2.1",
            "outbound_addr6=2001:db8::1",
            "mtu=1500",
        ])
        .unwrap();
        assert_eq!(opts.cidr.as_deref(), Some("10.0.3.0/24"));
        assert!(opts.is_slirp_host_forward);
        assert!(!opts.disable_host_loopback);
        assert!(!opts.enable_ipv6);
        assert_eq!(opts.outbound_addr.as_deref(), Some("192.0.2.1"));
        assert_eq!(opts.outbound_addr6.as_deref(), Some("2001:db8::1"));
        assert_eq!(opts.mtu, 1500);
    }

    #[test]
    fn container_options_override_global_ones() {
        let config = RuntimeConfig {
            network_cmd_options: vec!["mtu=1500".into(), "port_handler=slirp4netns".into()],
            ..RuntimeConfig::default()
        };
        let opts = NetworkOptions::parse(&config, &["mtu=9000".into()]).unwrap();
        assert_eq!(opts.mtu, 9000);
        assert!(opts.is_slirp_host_forward);
    }

    #[test]
    fn unknown_key_or_missing_value_fails() {
        assert!(parse(&["frobnicate=yes"]).is_err());
        assert!(parse(&["mtu"]).is_err());
        assert!(parse(&["mtu=1500", "bogus=1"]).is_err());
    }

    #[test]
    fn mtu_bounds() {
        assert!(parse(&["mtu=67"]).is_err());
        assert!(parse(&["mtu=abc"]).is_err());
        assert!(parse(&["mtu=-1"]).is_err());
        assert_eq!(parse(&["mtu=68"]).unwrap().mtu, 68);
    }

    #[test]
    fn bad_values_fail() {
        assert!(parse(&["cidr=10.0.3.0"]).is_err());
        assert!(parse(&["cidr=fd00::/64"]).is_err());
        assert!(parse(&["port_handler=pasta"]).is_err());
        assert!(parse(&["allow_host_loopback=yes"]).is_err());
        assert!(parse(&["enable_ipv6=1"]).is_err());
        assert!(parse(&["outbound_addr=2001:db8::1"]).is_err());
        assert!(parse(&["outbound_addr6=192.0.2.1"]).is_err());
        assert!(parse(&["outbound_addr=no-such-iface0"]).is_err());
    }

    #[test]
    fn mapped_ipv4_counts_as_ipv4() {
        let opts = parse(&["outbound_addr=::ffff:192.0.2.1"]).unwrap();
        assert_eq!(opts.outbound_addr.as_deref(), Some("::ffff:192.0.2.1"));
        assert!(parse(&["outbound_addr6=::ffff:192.0.2.1"]).is_err());
    }

    #[test]
    fn loopback_interface_is_accepted_by_name() {
        let opts = parse(&["outbound_addr=lo", "outbound_addr6=lo"]).unwrap();
        assert_eq!(opts.outbound_addr.as_deref(), Some("lo"));
    }

    #[test]
    fn subnet_resolution() {
        assert_eq!(parse(&[]).unwrap().subnet().unwrap().to_string(), "10.0.2.0/24");
        assert_eq!(
            parse(&["cidr=10.0.5.0/24"]).unwrap().subnet().unwrap().to_string(),
            "10.0.5.0/24"
        );
    }
}
