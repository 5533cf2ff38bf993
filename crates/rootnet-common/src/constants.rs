//! System-wide constants and default paths.

use std::path::PathBuf;
use std::time::Duration;

/// Name of the user-space network stack helper.
pub const SLIRP4NETNS_BINARY_NAME: &str = "slirp4netns";

/// Name of the port relay helper.
pub const ROOTLESSPORT_BINARY_NAME: &str = "rootlessport";

/// Subnet handed out by slirp4netns when no `cidr` option is given.
pub const DEFAULT_SLIRP4NETNS_SUBNET: &str = "10.0.2.0/24";

/// MTU used for the slirp4netns tap device unless overridden.
pub const SLIRP4NETNS_MTU: u32 = 65520;

/// Smallest MTU accepted for an IPv4 link.
pub const MIN_MTU: u32 = 68;

/// Name of the tap device created inside the container namespace.
pub const TAP_DEVICE: &str = "tap0";

/// Offset of the container address inside the slirp4netns subnet.
pub const SLIRP_GUEST_OFFSET: u32 = 100;
/// Offset of the gateway address inside the slirp4netns subnet.
pub const SLIRP_GATEWAY_OFFSET: u32 = 2;
/// Offset of the DNS forwarder address inside the slirp4netns subnet.
pub const SLIRP_DNS_OFFSET: u32 = 3;

/// Default `accept_dad` sysctl consulted when new interfaces appear.
pub const IPV6_ACCEPT_DAD_SYSCTL: &str = "/proc/sys/net/ipv6/conf/default/accept_dad";

/// Descriptor slot a helper watches to know when to exit.
pub const HELPER_EXIT_FD: i32 = 3;
/// Descriptor slot a helper writes to once it is ready.
pub const HELPER_READY_FD: i32 = 4;

/// Poll interval of the slirp4netns readiness barrier.
pub const SLIRP4NETNS_SYNC_INTERVAL: Duration = Duration::from_secs(1);
/// Poll interval of the rootlessport readiness barrier.
pub const ROOTLESSPORT_SYNC_INTERVAL: Duration = Duration::from_secs(3);

/// Upper bound on waiting for the slirp4netns API socket to appear.
pub const API_SOCKET_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
/// Poll interval used while waiting for the API socket.
pub const API_SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Largest response accepted from the slirp4netns API socket.
pub const API_RESPONSE_LIMIT: u64 = 2048;

/// Host address used for port forwarding when a mapping names none.
pub const DEFAULT_HOST_IP: &str = "0.0.0.0";

/// Directory (under the runtime tmp dir) holding rootlessport reload sockets.
pub const ROOTLESSPORT_SOCKET_DIR: &str = "rp";

/// Application name used in default paths.
pub const APP_NAME: &str = "rootnet";

/// Returns the default runtime temp directory.
///
/// Prefers `$XDG_RUNTIME_DIR/rootnet`, which is per-user and cleared on
/// logout, and falls back to `/tmp/rootnet-<uid>`.
pub fn default_tmp_dir() -> PathBuf {
    if let Some(runtime_dir) = std::env::var_os("XDG_RUNTIME_DIR") {
        if !runtime_dir.is_empty() {
            return PathBuf::from(runtime_dir).join(APP_NAME);
        }
    }
    let uid = std::fs::metadata("/proc/self").map_or(0, |m| {
        use std::os::unix::fs::MetadataExt;
        m.uid()
    });
    std::env::temp_dir().join(format!("{APP_NAME}-{uid}"))
}
