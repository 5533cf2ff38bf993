//! Selection of the container address targeted by the port relay.

use std::net::IpAddr;

use ipnet::Ipv4Net;
use rootnet_common::types::{NetworkMode, NetworkStatus};
use rootnet_core::addr;

/// Picks the address published ports are relayed to.
///
/// slirp4netns containers use the fixed guest address of their subnet.
/// Other containers use the first IPv4 address found across their network
/// attachments, else the first IPv6 address, else an empty string.
/// Attachments and interfaces are visited in name order.
#[must_use]
pub fn resolve(mode: &NetworkMode, slirp_subnet: Option<&Ipv4Net>, status: &NetworkStatus) -> String {
    if mode.is_slirp4netns() {
        return addr::slirp_ip(slirp_subnet).map_or_else(
            |e| {
                tracing::warn!(error = %e, "cannot compute slirp4netns guest address");
                String::new()
            },
            |ip| ip.to_string(),
        );
    }

    let mut first_v6 = None;
    let addresses = status
        .values()
        .flat_map(|block| block.interfaces.values())
        .flat_map(|iface| iface.subnets.iter())
        .map(|subnet| subnet.ipnet.addr());
    for ip in addresses {
        match ip {
            IpAddr::V4(v4) => return v4.to_string(),
            IpAddr::V6(v6) => {
                if let Some(v4) = v6.to_ipv4_mapped() {
                    return v4.to_string();
                }
                let _ = first_v6.get_or_insert(v6);
            }
        }
    }
    first_v6.map(|v6| v6.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use rootnet_common::types::{NetAddress, NetInterface, StatusBlock};

    use super::*;

    fn status(entries: &[(&str, &str, &[&str])]) -> NetworkStatus {
        let mut out = NetworkStatus::new();
        for (network, iface, addrs) in entries {
            let block: &mut StatusBlock = out.entry((*network).to_string()).or_default();
            let subnets = addrs
                .iter()
                .map(|a| NetAddress {
                    ipnet: a.parse().unwrap(),
                    gateway: None,
                })
                .collect();
            let _ = block
                .interfaces
                .insert((*iface).to_string(), NetInterface { subnets });
        }
        out
    }

    #[test]
    fn slirp_mode_uses_guest_address() {
        let st = status(&[("podman", "eth0", &["10.88.0.5/16"])]);
        assert_eq!(resolve(&NetworkMode::Slirp4netns, None, &st), "10.0.2.100");
        let net: Ipv4Net = "10.0.7.0/24".parse().unwrap();
        assert_eq!(resolve(&NetworkMode::Slirp4netns, Some(&net), &st), "10.0.7.100");
    }

    #[test]
    fn ipv4_is_preferred_over_earlier_ipv6() {
        let st = status(&[
            ("a-net", "eth0", &["fd00::5/64"]),
            ("b-net", "eth1", &["10.89.0.7/24"]),
        ]);
        assert_eq!(resolve(&NetworkMode::Bridge, None, &st), "10.89.0.7");
    }

    #[test]
    fn ipv6_fallback_takes_first_in_order() {
        let st = status(&[
            ("a-net", "eth0", &["fd00::5/64"]),
            ("b-net", "eth1", &["fd01::9/64"]),
        ]);
        assert_eq!(resolve(&NetworkMode::Bridge, None, &st), "fd00::5");
    }

    #[test]
    fn no_addresses_yields_empty() {
        assert_eq!(resolve(&NetworkMode::Bridge, None, &NetworkStatus::new()), "");
    }
}
