//! Host port publishing for rootless containers.
//!
//! Two interchangeable backends exist: sending `add_hostfwd` commands to
//! the slirp4netns API socket ([`control`]), or delegating to a
//! long-lived `rootlessport` relay ([`rootlessport`]) that can later be
//! pointed at a new container address ([`reload`]).

pub mod child_ip;
pub mod control;
pub mod reload;
pub mod rootlessport;

use ipnet::Ipv4Net;
use rootnet_common::types::{ContainerId, NetworkMode, NetworkStatus, PortMapping};

/// What the port backends need to know about a container.
#[derive(Debug, Clone, Copy)]
pub struct ContainerNetwork<'a> {
    /// Container identifier.
    pub id: &'a ContainerId,
    /// Ports to publish.
    pub port_mappings: &'a [PortMapping],
    /// Network mode the container runs with.
    pub mode: &'a NetworkMode,
    /// Subnet given to slirp4netns, when the container uses it.
    pub slirp_subnet: Option<&'a Ipv4Net>,
    /// Addresses of the container's other network attachments.
    pub status: &'a NetworkStatus,
}

impl ContainerNetwork<'_> {
    /// Address the relay forwards published ports to.
    #[must_use]
    pub fn child_ip(&self) -> String {
        child_ip::resolve(self.mode, self.slirp_subnet, self.status)
    }
}
