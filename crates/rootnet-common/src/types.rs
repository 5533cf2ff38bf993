//! Domain primitive types used across the rootnet workspace.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::RootnetError;

/// Unique identifier for a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport protocol of a forwarded port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
}

impl Protocol {
    /// Wire name of the protocol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = RootnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(RootnetError::config(format!("unsupported protocol {other:?}"))),
        }
    }
}

/// A host-to-container port mapping as configured on the container.
///
/// A mapping with `range = N` covers `N` consecutive ports on both sides,
/// starting at `host_port` and `container_port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Host address to bind; empty means all addresses.
    #[serde(default)]
    pub host_ip: String,
    /// First container port.
    pub container_port: u16,
    /// First host port.
    pub host_port: u16,
    /// Number of consecutive ports.
    pub range: u16,
    /// Protocols to forward, in the order they were configured.
    #[serde(rename = "protocol", with = "protocol_list")]
    pub protocols: Vec<Protocol>,
}

impl PortMapping {
    /// Creates a single-port TCP mapping.
    #[must_use]
    pub fn tcp(host_port: u16, container_port: u16) -> Self {
        Self {
            host_ip: String::new(),
            container_port,
            host_port,
            range: 1,
            protocols: vec![Protocol::Tcp],
        }
    }

    /// Sets the host address to bind.
    #[must_use]
    pub fn with_host_ip(mut self, ip: impl Into<String>) -> Self {
        self.host_ip = ip.into();
        self
    }
}

impl FromStr for PortMapping {
    type Err = RootnetError;

    /// Parses `[host_ip:]host_port[-end]:container_port[-end][/proto[,proto]]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RootnetError::config(format!("invalid port mapping {s:?}"));

        let (ports, protocols) = match s.split_once('/') {
            Some((ports, protos)) => (
                ports,
                protos
                    .split(',')
                    .map(str::parse)
                    .collect::<Result<Vec<Protocol>, _>>()?,
            ),
            None => (s, vec![Protocol::Tcp]),
        };

        let (host_part, container_part) = ports.rsplit_once(':').ok_or_else(invalid)?;
        let (host_ip, host_range) = match host_part.rsplit_once(':') {
            Some((ip, range)) => (ip.trim_matches(['[', ']']).to_string(), range),
            None => (String::new(), host_part),
        };

        let (host_port, host_len) = parse_port_range(host_range).ok_or_else(invalid)?;
        let (container_port, container_len) =
            parse_port_range(container_part).ok_or_else(invalid)?;
        if host_len != container_len {
            return Err(RootnetError::config(format!(
                "host and container port ranges differ in length in {s:?}"
            )));
        }

        Ok(Self {
            host_ip,
            container_port,
            host_port,
            range: host_len,
            protocols,
        })
    }
}

/// Parses `start` or `start-end` into `(start, length)`.
fn parse_port_range(s: &str) -> Option<(u16, u16)> {
    match s.split_once('-') {
        Some((start, end)) => {
            let start: u16 = start.parse().ok()?;
            let end: u16 = end.parse().ok()?;
            if end < start {
                return None;
            }
            Some((start, (end - start).checked_add(1)?))
        }
        None => Some((s.parse().ok()?, 1)),
    }
}

/// Serializes a protocol list as the comma-joined string the helpers expect.
mod protocol_list {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Protocol;

    pub fn serialize<S: Serializer>(protocols: &[Protocol], s: S) -> Result<S::Ok, S::Error> {
        let joined = protocols
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(",");
        s.serialize_str(&joined)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Protocol>, D::Error> {
        let raw = String::deserialize(d)?;
        raw.split(',')
            .map(|p| p.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Network mode the container was created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// User-space networking through slirp4netns.
    Slirp4netns,
    /// Bridge networking managed by a network backend.
    Bridge,
    /// Any other mode (host, none, container:<id>, ...).
    Other(String),
}

impl NetworkMode {
    /// Whether the container uses slirp4netns.
    #[must_use]
    pub const fn is_slirp4netns(&self) -> bool {
        matches!(self, Self::Slirp4netns)
    }

    /// Whether the container uses bridge networking.
    #[must_use]
    pub const fn is_bridge(&self) -> bool {
        matches!(self, Self::Bridge)
    }
}

/// One address configured on a container interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetAddress {
    /// Address with its prefix length.
    pub ipnet: IpNet,
    /// Gateway of the subnet, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,
}

/// Addresses configured on one container interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetInterface {
    /// Subnets assigned to the interface.
    #[serde(default)]
    pub subnets: Vec<NetAddress>,
}

/// Result of attaching a container to one network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBlock {
    /// Interfaces keyed by name inside the container.
    #[serde(default)]
    pub interfaces: BTreeMap<String, NetInterface>,
}

/// Attachment status keyed by network name.
pub type NetworkStatus = BTreeMap<String, StatusBlock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_serializes_protocols_as_joined_string() {
        let mapping = PortMapping {
            host_ip: "127.0.0.1".into(),
            container_port: 80,
            host_port: 8080,
            range: 2,
            protocols: vec![Protocol::Tcp, Protocol::Udp],
        };
        let json = serde_json::to_value(&mapping).expect("serialize");
        assert_eq!(json["protocol"], "tcp,udp");
        assert_eq!(json["host_ip"], "127.0.0.1");
        assert_eq!(json["range"], 2);

        let back: PortMapping = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, mapping);
    }

    #[test]
    fn parse_plain_mapping() {
        let m: PortMapping = "8080:80".parse().expect("parse");
        assert_eq!(m, PortMapping::tcp(8080, 80));
    }

    #[test]
    fn parse_mapping_with_ip_range_and_protocols() {
        let m: PortMapping = "127.0.0.1:8080-8081:80-81/tcp,udp".parse().expect("parse");
        assert_eq!(m.host_ip, "127.0.0.1");
        assert_eq!(m.host_port, 8080);
        assert_eq!(m.container_port, 80);
        assert_eq!(m.range, 2);
        assert_eq!(m.protocols, vec![Protocol::Tcp, Protocol::Udp]);
    }

    #[test]
    fn parse_rejects_mismatched_ranges() {
        assert!("8080-8082:80-81".parse::<PortMapping>().is_err());
        assert!("8080".parse::<PortMapping>().is_err());
        assert!("8080:80/sctp".parse::<PortMapping>().is_err());
    }

    #[test]
    fn network_mode_predicates() {
        assert!(NetworkMode::Slirp4netns.is_slirp4netns());
        assert!(NetworkMode::Bridge.is_bridge());
        assert!(!NetworkMode::Other("host".into()).is_bridge());
    }
}
