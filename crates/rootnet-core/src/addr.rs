//! Address arithmetic inside the slirp4netns subnet.
//!
//! slirp4netns places the gateway, the DNS forwarder and the container at
//! fixed offsets from the subnet base. Offsets are added as big-endian
//! 32-bit integers and the result must stay inside the subnet.

use std::net::Ipv4Addr;

use ipnet::{IpNet, Ipv4Net};
use rootnet_common::constants::{SLIRP_DNS_OFFSET, SLIRP_GATEWAY_OFFSET, SLIRP_GUEST_OFFSET};
use rootnet_common::error::{Result, RootnetError};

/// Returns the default slirp4netns subnet, `10.0.2.0/24`.
#[must_use]
pub fn default_subnet() -> Ipv4Net {
    let base = Ipv4Addr::new(10, 0, 2, 0);
    // A /24 prefix is always valid.
    Ipv4Net::new(base, 24).unwrap_or_else(|_| Ipv4Net::from(base))
}

/// Parses an IPv4 CIDR such as `10.0.3.0/24`.
///
/// Host bits are cleared, so `10.0.3.7/24` yields `10.0.3.0/24`.
///
/// # Errors
///
/// Returns a configuration error if `value` is not a CIDR or names an
/// IPv6 network.
pub fn parse_ipv4_cidr(value: &str) -> Result<Ipv4Net> {
    match value.parse::<IpNet>() {
        Ok(IpNet::V4(net)) => Ok(net.trunc()),
        Ok(IpNet::V6(_)) => Err(RootnetError::config(format!(
            "invalid cidr {value:?}: only IPv4 is supported"
        ))),
        Err(e) => Err(RootnetError::config(format!("invalid cidr {value:?}: {e}"))),
    }
}

/// Adds `offset` to the network address of `subnet`.
///
/// # Errors
///
/// Returns [`RootnetError::AddressOverflow`] if the sum does not fit in 32
/// bits, and [`RootnetError::AddressOutsideSubnet`] if it leaves `subnet`.
pub fn add_to_ip(subnet: &Ipv4Net, offset: u32) -> Result<Ipv4Addr> {
    let base = subnet.network();
    let sum = u32::from(base)
        .checked_add(offset)
        .ok_or(RootnetError::AddressOverflow { base, offset })?;
    let address = Ipv4Addr::from(sum);
    if !subnet.contains(&address) {
        return Err(RootnetError::AddressOutsideSubnet {
            address,
            subnet: subnet.to_string(),
        });
    }
    Ok(address)
}

fn at_offset(subnet: Option<&Ipv4Net>, offset: u32) -> Result<Ipv4Addr> {
    match subnet {
        Some(net) => add_to_ip(net, offset),
        None => add_to_ip(&default_subnet(), offset),
    }
}

/// Container address: subnet base + 100 (`10.0.2.100` by default).
///
/// # Errors
///
/// Fails if the subnet is too small to hold the offset.
pub fn slirp_ip(subnet: Option<&Ipv4Net>) -> Result<Ipv4Addr> {
    at_offset(subnet, SLIRP_GUEST_OFFSET)
}

/// Gateway address: subnet base + 2 (`10.0.2.2` by default).
///
/// # Errors
///
/// Fails if the subnet is too small to hold the offset.
pub fn slirp_gateway(subnet: Option<&Ipv4Net>) -> Result<Ipv4Addr> {
    at_offset(subnet, SLIRP_GATEWAY_OFFSET)
}

/// DNS forwarder address: subnet base + 3 (`10.0.2.3` by default).
///
/// # Errors
///
/// Fails if the subnet is too small to hold the offset.
pub fn slirp_dns(subnet: Option<&Ipv4Net>) -> Result<Ipv4Addr> {
    at_offset(subnet, SLIRP_DNS_OFFSET)
}
