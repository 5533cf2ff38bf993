//! Port publishing through the slirp4netns API socket.
//!
//! Every forwarded port is one request on its own connection: a JSON
//! command terminated by a newline, then a write shutdown, then a JSON
//! reply of at most 2048 bytes that carries an `error` member on failure.

use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use rootnet_common::constants::{
    API_RESPONSE_LIMIT, API_SOCKET_POLL_INTERVAL, API_SOCKET_WAIT_TIMEOUT, DEFAULT_HOST_IP,
    SLIRP4NETNS_BINARY_NAME,
};
use rootnet_common::error::{Result, RootnetError};
use rootnet_common::types::PortMapping;
use serde::{Deserialize, Deserializer, Serialize};

use crate::wait::wait_for_file;

/// A request sent to the API socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlCommand {
    /// Command name.
    pub execute: &'static str,
    /// Command arguments.
    pub arguments: HostForwardArgs,
}

/// Arguments of `add_hostfwd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostForwardArgs {
    /// `tcp` or `udp`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub proto: String,
    /// Host address to listen on.
    pub host_addr: String,
    /// Host port to listen on.
    pub host_port: u16,
    /// Guest address; empty lets slirp4netns pick the container address.
    pub guest_addr: String,
    /// Port inside the container.
    pub guest_port: u16,
}

impl ControlCommand {
    /// Builds an `add_hostfwd` command.
    #[must_use]
    pub fn add_hostfwd(proto: &str, host_addr: &str, host_port: u16, guest_port: u16) -> Self {
        Self {
            execute: "add_hostfwd",
            arguments: HostForwardArgs {
                proto: proto.to_string(),
                host_addr: host_addr.to_string(),
                host_port,
                guest_addr: String::new(),
                guest_port,
            },
        }
    }
}

/// Reply from the API socket. A present `error` member means failure,
/// whatever its value.
#[derive(Debug, Default, Deserialize)]
pub struct ControlResponse {
    /// Error reported by slirp4netns.
    #[serde(default, deserialize_with = "error_text")]
    pub error: Option<String>,
}

fn error_text<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(Some(match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }))
}

/// Expands mappings into one command per port.
///
/// Mappings keep their order; within a mapping each protocol covers the
/// whole range before the next protocol starts.
///
/// # Errors
///
/// Returns [`RootnetError::Config`] if a range runs past port 65535.
pub fn expand_forwards(mappings: &[PortMapping]) -> Result<Vec<ControlCommand>> {
    let mut commands = Vec::new();
    for mapping in mappings {
        let host_ip = if mapping.host_ip.is_empty() {
            DEFAULT_HOST_IP
        } else {
            mapping.host_ip.as_str()
        };
        for proto in &mapping.protocols {
            for offset in 0..mapping.range {
                let (Some(host_port), Some(guest_port)) = (
                    mapping.host_port.checked_add(offset),
                    mapping.container_port.checked_add(offset),
                ) else {
                    return Err(RootnetError::config(format!(
                        "port range of {mapping:?} exceeds 65535"
                    )));
                };
                commands.push(ControlCommand::add_hostfwd(
                    proto.as_str(),
                    host_ip,
                    host_port,
                    guest_port,
                ));
            }
        }
    }
    Ok(commands)
}

/// Sends one command on a fresh connection and checks the reply.
///
/// # Errors
///
/// Returns [`RootnetError::Io`] if the socket cannot be used and
/// [`RootnetError::Protocol`] if the reply is malformed or reports an
/// error.
pub fn open_port(api_socket: &Path, command: &ControlCommand) -> Result<()> {
    let io_err = |e| RootnetError::Io {
        path: api_socket.to_path_buf(),
        source: e,
    };

    let mut stream = UnixStream::connect(api_socket).map_err(io_err)?;
    let mut payload = serde_json::to_vec(command)?;
    payload.push(b'\n');
    stream.write_all(&payload).map_err(io_err)?;
    stream.shutdown(Shutdown::Write).map_err(io_err)?;

    let mut buf = Vec::new();
    let _ = (&mut stream)
        .take(API_RESPONSE_LIMIT)
        .read_to_end(&mut buf)
        .map_err(io_err)?;

    let response: ControlResponse =
        serde_json::from_slice(&buf).map_err(|e| RootnetError::Protocol {
            endpoint: api_socket.to_path_buf(),
            message: format!("parsing error status from slirp4netns: {e}"),
        })?;
    if let Some(error) = response.error {
        return Err(RootnetError::Protocol {
            endpoint: api_socket.to_path_buf(),
            message: format!("from slirp4netns while setting up port redirection: {error}"),
        });
    }

    tracing::trace!(
        proto = %command.arguments.proto,
        host_port = command.arguments.host_port,
        guest_port = command.arguments.guest_port,
        "port forwarded"
    );
    Ok(())
}

/// Publishes `mappings` through the API socket of a running slirp4netns.
///
/// Waits for the socket to appear while watching `helper`; the helper
/// exiting in the meantime fails the wait straight away.
///
/// # Errors
///
/// Returns an error if the helper exits, the socket never appears, or any
/// command fails. Ports forwarded before a failure stay forwarded.
pub fn setup_via_slirp(helper: &mut Child, api_socket: &Path, mappings: &[PortMapping]) -> Result<()> {
    let commands = expand_forwards(mappings)?;
    let pid = helper.id();

    let stop = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel();
    thread::scope(|s| {
        let _monitor = s.spawn(|| monitor_helper(helper, &stop, &tx));
        let waited = wait_for_file(api_socket, &rx, API_SOCKET_WAIT_TIMEOUT);
        stop.store(true, Ordering::Relaxed);
        waited
    })?;
    tracing::debug!(pid, socket = %api_socket.display(), "slirp4netns API socket ready");

    for command in &commands {
        open_port(api_socket, command)?;
    }
    tracing::debug!(pid, ports = commands.len(), "slirp4netns port forwarding ready");
    Ok(())
}

/// Polls `helper` until it exits, `stop` is set, or the socket wait ceiling
/// passes.
fn monitor_helper(helper: &mut Child, stop: &AtomicBool, tx: &mpsc::Sender<RootnetError>) {
    let started = Instant::now();
    while started.elapsed() < API_SOCKET_WAIT_TIMEOUT && !stop.load(Ordering::Relaxed) {
        match helper.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                let _ = tx.send(RootnetError::HelperExited {
                    program: SLIRP4NETNS_BINARY_NAME.to_string(),
                    status: status.to_string(),
                });
                return;
            }
            Err(e) => {
                tracing::debug!(error = %e, "stopped watching slirp4netns");
                return;
            }
        }
        thread::sleep(API_SOCKET_POLL_INTERVAL);
    }
}
