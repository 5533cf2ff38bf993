//! slirp4netns launch.
//!
//! Ties the pieces together for one container: locate and probe the
//! binary, build its command line, start it with the exit and ready pipes
//! on fds 3 and 4, wait for readiness with DAD switched off, then publish
//! ports through the selected backend.

use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use ipnet::Ipv4Net;
use rootnet_common::config::RuntimeConfig;
use rootnet_common::constants::{
    HELPER_EXIT_FD, HELPER_READY_FD, SLIRP4NETNS_BINARY_NAME, SLIRP4NETNS_SYNC_INTERVAL, TAP_DEVICE,
};
use rootnet_common::error::{Result, RootnetError};
use rootnet_common::types::{ContainerId, NetworkMode, NetworkStatus, PortMapping};
use rootnet_core::namespace::network::netns_path_for_pid;
use rootnet_core::process::cloexec_pipe;
use rootnet_core::process::fd::add_pre_exec_hook;
use rootnet_core::process::helper::HelperProcess;
use rootnet_core::process::reaper::Reaper;
use rootnet_core::process::sync::wait_for_sync;

use super::args::build_args;
use super::dad::DadGuard;
use super::features::probe;
use super::options::NetworkOptions;
use crate::binary::find_helper_binary;
use crate::logs::{create_unlinked_log, log_path};
use crate::portfwd::ContainerNetwork;
use crate::portfwd::control::setup_via_slirp;
use crate::portfwd::rootlessport::{RootlessPort, setup_via_rootlessport};

/// Network namespace slirp4netns attaches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetnsTarget {
    /// A namespace created ahead of the container, by path.
    Path(PathBuf),
    /// The namespace of a running process, configured after it started.
    Pid(u32),
}

impl NetnsTarget {
    /// Filesystem path of the namespace.
    #[must_use]
    pub fn netns_path(&self) -> PathBuf {
        match self {
            Self::Path(path) => path.clone(),
            Self::Pid(pid) => netns_path_for_pid(*pid),
        }
    }

    /// Trailing slirp4netns arguments selecting the namespace and tap device.
    fn args(&self) -> Vec<String> {
        match self {
            Self::Path(path) => vec![
                "--netns-type=path".to_string(),
                path.display().to_string(),
                TAP_DEVICE.to_string(),
            ],
            Self::Pid(pid) => vec![pid.to_string(), TAP_DEVICE.to_string()],
        }
    }
}

/// Inputs of one slirp4netns setup.
#[derive(Debug, Clone)]
pub struct SlirpRequest<'a> {
    /// Container identifier.
    pub container_id: &'a ContainerId,
    /// Ports to publish.
    pub port_mappings: &'a [PortMapping],
    /// Per-container `key=value` options, applied after the global ones.
    pub network_options: &'a [String],
    /// Namespace to attach to.
    pub netns: NetnsTarget,
}

/// How published ports are served.
#[derive(Debug)]
pub enum PortForward {
    /// Forwarded by slirp4netns itself through its API socket.
    Slirp {
        /// API socket path.
        api_socket: PathBuf,
    },
    /// Relayed by a `rootlessport` process.
    Rootlessport(RootlessPort),
}

/// A running slirp4netns attached to a container.
#[derive(Debug)]
pub struct SlirpNetwork {
    /// Effective IPv4 subnet of the container.
    pub subnet: Ipv4Net,
    /// slirp4netns process ID.
    pub pid: u32,
    /// Write end of the exit pipe; closing it stops slirp4netns.
    pub exit_fd: OwnedFd,
    /// Port publishing, when the container has ports.
    pub port_forward: Option<PortForward>,
}

/// Starts slirp4netns for a container and publishes its ports.
///
/// Once the process has started it is handed to `reaper` on every return
/// path. A helper that dies before it is ready needs no cleanup. When port
/// publishing fails after slirp4netns is ready, the helper is left running
/// and its exit descriptor comes back inside
/// [`RootnetError::HelperLeftRunning`] for the caller's teardown to close.
///
/// # Errors
///
/// Fails on invalid options, a missing or unusable binary, an option the
/// binary does not support, a helper that exits before it is ready, or a
/// port backend failure.
pub fn setup_slirp4netns(
    config: &RuntimeConfig,
    request: &SlirpRequest<'_>,
    reaper: Arc<dyn Reaper>,
) -> Result<SlirpNetwork> {
    launch(config, request, reaper, DadGuard::spawn)
}

/// Body of [`setup_slirp4netns`]; `disable_dad` is called with the target
/// namespace path right before the helper is spawned.
fn launch(
    config: &RuntimeConfig,
    request: &SlirpRequest<'_>,
    reaper: Arc<dyn Reaper>,
    disable_dad: impl FnOnce(&Path) -> DadGuard,
) -> Result<SlirpNetwork> {
    let path = match &config.network_cmd_path {
        Some(path) => path.clone(),
        None => find_helper_binary(config, SLIRP4NETNS_BINARY_NAME, true)?,
    };

    let options = NetworkOptions::parse(config, request.network_options)?;
    let subnet = options.subnet()?;
    let features = probe(&path)?;
    let mut args = build_args(&options, &features)?;

    // -c: bring up the tap device, -e: exit fd, -r: ready fd.
    args.extend(
        ["-c", "-e", "3", "-r", "4"]
            .iter()
            .map(ToString::to_string),
    );

    let have_ports = !request.port_mappings.is_empty();
    let api_socket = (have_ports && options.is_slirp_host_forward)
        .then(|| api_socket_path(&config.tmp_dir, request.container_id));
    if let Some(socket) = &api_socket {
        args.push("--api-socket".to_string());
        args.push(socket.display().to_string());
    }
    args.extend(request.netns.args());
    let netns_path = request.netns.netns_path();

    let (mut ready_r, ready_w) = cloexec_pipe()?;
    let (exit_r, exit_w) = cloexec_pipe()?;
    let mut log = create_unlinked_log(&config.tmp_dir, SLIRP4NETNS_BINARY_NAME, request.container_id)?;
    let log_err = |e| log_error(&config.tmp_dir, request.container_id, e);

    let mut cmd = Command::new(&path);
    let _ = cmd
        .args(&args)
        .stdin(Stdio::null())
        .stdout(log.try_clone().map_err(log_err)?)
        .stderr(log.try_clone().map_err(log_err)?)
        .process_group(0);
    let sandbox = !options.no_pivot_root && features.enable_sandbox;
    add_pre_exec_hook(
        &mut cmd,
        &[(exit_r.as_fd(), HELPER_EXIT_FD), (ready_w.as_fd(), HELPER_READY_FD)],
        sandbox,
    );
    tracing::debug!(command = %format!("{} {}", path.display(), args.join(" ")), "slirp4netns command");

    let dad = options.enable_ipv6.then(|| disable_dad(&netns_path));

    let child = cmd.spawn().map_err(|e| RootnetError::Io {
        path: path.clone(),
        source: e,
    })?;
    drop(cmd);
    drop(exit_r);
    let mut helper = HelperProcess::new(child, SLIRP4NETNS_BINARY_NAME, reaper.clone());
    let program = helper.program();

    let synced = wait_for_sync(
        &mut ready_r,
        helper.child_mut(),
        &mut log,
        SLIRP4NETNS_SYNC_INTERVAL,
        program,
    );
    if let Some(dad) = dad {
        dad.finish();
    }
    drop(ready_w);
    synced?;

    tracing::info!(
        container = %request.container_id,
        pid = helper.pid(),
        %subnet,
        "slirp4netns is ready"
    );

    let forwarded = if !have_ports {
        Ok(None)
    } else if let Some(api_socket) = api_socket {
        setup_via_slirp(helper.child_mut(), &api_socket, request.port_mappings)
            .map(|()| Some(PortForward::Slirp { api_socket }))
    } else {
        let status = NetworkStatus::new();
        let network = ContainerNetwork {
            id: request.container_id,
            port_mappings: request.port_mappings,
            mode: &NetworkMode::Slirp4netns,
            slirp_subnet: Some(&subnet),
            status: &status,
        };
        setup_via_rootlessport(config, &network, &netns_path, reaper)
            .map(|relay| Some(PortForward::Rootlessport(relay)))
    };

    match forwarded {
        Ok(port_forward) => Ok(SlirpNetwork {
            subnet,
            pid: helper.pid(),
            exit_fd: exit_w,
            port_forward,
        }),
        Err(e) => {
            tracing::warn!(pid = helper.pid(), error = %e, "port forwarding failed, leaving slirp4netns running");
            Err(RootnetError::HelperLeftRunning {
                program: program.to_string(),
                pid: helper.pid(),
                exit_fd: exit_w,
                source: Box::new(e),
            })
        }
    }
}

/// Failure on the slirp4netns log sink, reported against its path.
fn log_error(tmp_dir: &Path, container_id: &ContainerId, source: std::io::Error) -> RootnetError {
    RootnetError::Io {
        path: log_path(tmp_dir, SLIRP4NETNS_BINARY_NAME, container_id),
        source,
    }
}

/// Path of the slirp4netns API socket for a container.
#[must_use]
pub fn api_socket_path(tmp_dir: &Path, container_id: &ContainerId) -> PathBuf {
    tmp_dir.join(format!("{container_id}.net"))
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    use rootnet_core::process::reaper::PollingReaper;

    use super::*;

    /// A slirp4netns stand-in that copies the DAD sysctl it sees at
    /// startup to `dad.seen`, then runs `run`.
    fn fake_slirp(dir: &Path, sysctl: &Path, run: &str) -> PathBuf {
        let bin = dir.join("slirp4netns");
        std::fs::write(
            &bin,
            format!(
                "#!/bin/sh\n\
                 if [ \"$1\" = \"--help\" ]; then echo '--mtu=MTU --enable-ipv6'; exit 0; fi\n\
                 cat '{}' > '{}'\n{run}\n",
                sysctl.display(),
                dir.join("dad.seen").display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        bin
    }

    fn run_with_dad(dir: &Path, run: &str) -> Result<SlirpNetwork> {
        let sysctl = dir.join("accept_dad");
        std::fs::write(&sysctl, "1\n").unwrap();
        let config = RuntimeConfig {
            tmp_dir: dir.join("run"),
            network_cmd_path: Some(fake_slirp(dir, &sysctl, run)),
            ..RuntimeConfig::default()
        };
        let id = ContainerId::new("ctr-dad");
        launch(
            &config,
            &SlirpRequest {
                container_id: &id,
                port_mappings: &[],
                network_options: &[],
                netns: NetnsTarget::Pid(1),
            },
            Arc::new(PollingReaper::new(Duration::from_millis(50))),
            move |_: &Path| DadGuard::spawn_at(None, sysctl),
        )
    }

    #[test]
    fn log_errors_name_the_log_file() {
        let err = log_error(
            Path::new("/run/rn"),
            &ContainerId::new("abc"),
            std::io::Error::from(std::io::ErrorKind::Other),
        );
        match err {
            RootnetError::Io { path, .. } => {
                assert_eq!(path, PathBuf::from("/run/rn/slirp4netns-abc.log"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn dad_is_off_during_start_and_restored_after() {
        let dir = tempfile::tempdir().unwrap();
        let net = run_with_dad(dir.path(), "echo 1 >&4\ncat <&3 >/dev/null").expect("setup");

        assert_eq!(std::fs::read_to_string(dir.path().join("dad.seen")).unwrap(), "0");
        assert_eq!(std::fs::read_to_string(dir.path().join("accept_dad")).unwrap(), "1\n");
        drop(net);
    }

    #[test]
    fn dad_is_restored_when_helper_dies() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_with_dad(dir.path(), "echo 'no tun device' >&2\nexit 1").unwrap_err();

        assert!(matches!(err, RootnetError::Startup { .. }), "{err:?}");
        assert_eq!(std::fs::read_to_string(dir.path().join("dad.seen")).unwrap(), "0");
        assert_eq!(std::fs::read_to_string(dir.path().join("accept_dad")).unwrap(), "1\n");
    }

    #[test]
    fn netns_arguments() {
        let by_path = NetnsTarget::Path(PathBuf::from("/run/user/1000/netns/ns1"));
        assert_eq!(
            by_path.args(),
            vec!["--netns-type=path", "/run/user/1000/netns/ns1", "tap0"]
        );
        assert_eq!(by_path.netns_path(), PathBuf::from("/run/user/1000/netns/ns1"));

        let by_pid = NetnsTarget::Pid(4242);
        assert_eq!(by_pid.args(), vec!["4242", "tap0"]);
        assert_eq!(by_pid.netns_path(), PathBuf::from("/proc/4242/ns/net"));
    }

    #[test]
    fn api_socket_is_named_after_container() {
        assert_eq!(
            api_socket_path(Path::new("/run/rn"), &ContainerId::new("abc")),
            PathBuf::from("/run/rn/abc.net")
        );
    }
}
