//! Pointing a running `rootlessport` at a new container address.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use rootnet_common::constants::ROOTLESSPORT_SOCKET_DIR;
use rootnet_common::error::{Result, RootnetError};
use rootnet_common::types::ContainerId;

use super::ContainerNetwork;

/// Returns the reload socket of a container's relay.
#[must_use]
pub fn reload_socket_path(tmp_dir: &Path, container_id: &ContainerId) -> PathBuf {
    tmp_dir
        .join(ROOTLESSPORT_SOCKET_DIR)
        .join(container_id.as_str())
}

/// Sends the container's current address to its relay.
///
/// Does nothing for a container without published ports.
///
/// # Errors
///
/// Returns [`RootnetError::Io`] if the socket cannot be reached and
/// [`RootnetError::Protocol`] if the relay answers anything but `OK`.
pub fn reload_port_mappings(tmp_dir: &Path, network: &ContainerNetwork<'_>) -> Result<()> {
    if network.port_mappings.is_empty() {
        return Ok(());
    }
    let child_ip = network.child_ip();
    tracing::debug!(container = %network.id, %child_ip, "reloading rootless ports");
    send_child_ip(&reload_socket_path(tmp_dir, network.id), &child_ip)
}

/// Writes `child_ip` as a JSON string line and reads the whole reply.
///
/// # Errors
///
/// See [`reload_port_mappings`].
pub fn send_child_ip(socket: &Path, child_ip: &str) -> Result<()> {
    let io_err = |e| RootnetError::Io {
        path: socket.to_path_buf(),
        source: e,
    };

    let mut conn = UnixStream::connect(socket).map_err(|e| {
        tracing::warn!(
            socket = %socket.display(),
            error = %e,
            "could not reload rootless port mappings, port forwarding may no longer work correctly"
        );
        io_err(e)
    })?;

    let mut request = serde_json::to_vec(child_ip)?;
    request.push(b'\n');
    conn.write_all(&request).map_err(io_err)?;

    let mut reply = Vec::new();
    let _ = conn.read_to_end(&mut reply).map_err(io_err)?;
    if reply != b"OK" {
        return Err(RootnetError::Protocol {
            endpoint: socket.to_path_buf(),
            message: format!("port reloading failed: {}", String::from_utf8_lossy(&reply)),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::BufRead;
    use std::io::BufReader;
    use std::os::unix::net::UnixListener;
    use std::thread;

    use rootnet_common::types::{NetworkMode, NetworkStatus, PortMapping};

    use super::*;

    /// Serves one connection, returning the received line.
    fn serve_once(socket: &Path, reply: &'static [u8]) -> thread::JoinHandle<String> {
        let listener = UnixListener::bind(socket).unwrap();
        thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut line = String::new();
            let _ = BufReader::new(&mut conn).read_line(&mut line).unwrap();
            conn.write_all(reply).unwrap();
            line
        })
    }

    #[test]
    fn ok_reply_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("rp.sock");
        let server = serve_once(&socket, b"OK");

        send_child_ip(&socket, "10.0.2.100").unwrap();
        assert_eq!(server.join().unwrap(), "\"10.0.2.100\"\n");
    }

    #[test]
    fn other_reply_is_the_error() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("rp.sock");
        let server = serve_once(&socket, b"permission denied");

        let err = send_child_ip(&socket, "10.0.2.100").unwrap_err();
        let _ = server.join().unwrap();
        match err {
            RootnetError::Protocol { message, .. } => {
                assert_eq!(message, "port reloading failed: permission denied");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn reload_uses_per_container_socket() {
        let dir = tempfile::tempdir().unwrap();
        let id = ContainerId::new("ctr1");
        let socket = reload_socket_path(dir.path(), &id);
        std::fs::create_dir_all(socket.parent().unwrap()).unwrap();
        let server = serve_once(&socket, b"OK");

        let mappings = vec![PortMapping::tcp(8080, 80)];
        let status = NetworkStatus::new();
        let network = ContainerNetwork {
            id: &id,
            port_mappings: &mappings,
            mode: &NetworkMode::Slirp4netns,
            slirp_subnet: None,
            status: &status,
        };
        reload_port_mappings(dir.path(), &network).unwrap();
        assert_eq!(server.join().unwrap(), "\"10.0.2.100\"\n");
    }

    #[test]
    fn no_ports_means_no_connection() {
        let dir = tempfile::tempdir().unwrap();
        let id = ContainerId::new("ctr2");
        let status = NetworkStatus::new();
        let network = ContainerNetwork {
            id: &id,
            port_mappings: &[],
            mode: &NetworkMode::Bridge,
            slirp_subnet: None,
            status: &status,
        };
        reload_port_mappings(dir.path(), &network).unwrap();
    }
}
