//! Port publishing through a delegated `rootlessport` relay.
//!
//! The relay receives its whole configuration as one JSON document on
//! stdin. It prints a one-line human-readable error on stdout when it
//! cannot start and writes debug output on stderr. Readiness and shutdown
//! use the same exit/ready descriptor pair as slirp4netns.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{ChildStderr, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use rootnet_common::config::RuntimeConfig;
use rootnet_common::constants::{
    HELPER_EXIT_FD, HELPER_READY_FD, ROOTLESSPORT_BINARY_NAME, ROOTLESSPORT_SYNC_INTERVAL,
};
use rootnet_common::error::{Result, RootnetError};
use rootnet_common::types::PortMapping;
use rootnet_core::latch::{Waiter, latch};
use rootnet_core::namespace::user::is_rootless;
use rootnet_core::process::fd::add_pre_exec_hook;
use rootnet_core::process::helper::HelperProcess;
use rootnet_core::process::reaper::Reaper;
use rootnet_core::process::sync::wait_for_sync;
use rootnet_core::process::cloexec_pipe;
use serde::{Deserialize, Serialize};

use super::ContainerNetwork;
use crate::binary::find_helper_binary;
use crate::logs::create_unlinked_log;

/// Most stdout bytes kept for the error message.
const STDOUT_LIMIT: usize = 4096;

/// How long to wait for the relay's stdout to drain after it failed.
const STDOUT_GRACE: Duration = Duration::from_secs(1);

/// Configuration document read by `rootlessport` on stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootlessPortConfig {
    /// Ports to publish.
    #[serde(rename = "Mappings")]
    pub mappings: Vec<PortMapping>,
    /// Network namespace of the container.
    #[serde(rename = "NetNSPath")]
    pub netns_path: String,
    /// Descriptor slot of the exit pipe.
    #[serde(rename = "ExitFD")]
    pub exit_fd: i32,
    /// Descriptor slot of the ready pipe.
    #[serde(rename = "ReadyFD")]
    pub ready_fd: i32,
    /// Runtime tmp dir; the reload socket lives under it.
    #[serde(rename = "TmpDir")]
    pub tmp_dir: PathBuf,
    /// Container address ports are relayed to.
    #[serde(rename = "ChildIP")]
    pub child_ip: String,
    /// Container identifier.
    #[serde(rename = "ContainerID")]
    pub container_id: String,
    /// The container uses bridge networking set up rootless.
    #[serde(rename = "RootlessCNI")]
    pub rootless_cni: bool,
}

impl RootlessPortConfig {
    /// Builds the relay configuration for `network`.
    #[must_use]
    pub fn new(tmp_dir: &Path, network: &ContainerNetwork<'_>, netns_path: &Path) -> Self {
        Self {
            mappings: network.port_mappings.to_vec(),
            netns_path: netns_path.display().to_string(),
            exit_fd: HELPER_EXIT_FD,
            ready_fd: HELPER_READY_FD,
            tmp_dir: tmp_dir.to_path_buf(),
            child_ip: network.child_ip(),
            container_id: network.id.to_string(),
            rootless_cni: network.mode.is_bridge() && is_rootless(),
        }
    }
}

/// A running relay.
#[derive(Debug)]
pub struct RootlessPort {
    /// Relay process ID.
    pub pid: u32,
    /// Write end of the exit pipe; closing it stops the relay.
    pub exit_fd: OwnedFd,
}

/// Starts `rootlessport` for `network` and waits until it is ready.
///
/// # Errors
///
/// Fails if the relay binary is missing, cannot be started, or exits
/// before it is ready. A non-empty stdout message from the relay is
/// preferred as the error over its log.
pub fn setup_via_rootlessport(
    config: &RuntimeConfig,
    network: &ContainerNetwork<'_>,
    netns_path: &Path,
    reaper: Arc<dyn Reaper>,
) -> Result<RootlessPort> {
    let (mut ready_r, ready_w) = cloexec_pipe()?;
    let (exit_r, exit_w) = cloexec_pipe()?;
    let mut log = create_unlinked_log(&config.tmp_dir, ROOTLESSPORT_BINARY_NAME, network.id)?;

    let cfg = RootlessPortConfig::new(&config.tmp_dir, network, netns_path);
    let cfg_json = serde_json::to_vec(&cfg)?;
    let path = find_helper_binary(config, ROOTLESSPORT_BINARY_NAME, false)?;

    let mut cmd = Command::new(&path);
    let _ = cmd
        .arg0(ROOTLESSPORT_BINARY_NAME)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);
    add_pre_exec_hook(
        &mut cmd,
        &[(exit_r.as_fd(), HELPER_EXIT_FD), (ready_w.as_fd(), HELPER_READY_FD)],
        false,
    );

    tracing::debug!(
        binary = %path.display(),
        container = %network.id,
        child_ip = %cfg.child_ip,
        "starting rootlessport"
    );
    let mut child = cmd.spawn().map_err(|e| RootnetError::Io {
        path: path.clone(),
        source: e,
    })?;
    drop(exit_r);

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut helper = HelperProcess::new(child, ROOTLESSPORT_BINARY_NAME, reaper);

    let feeder = stdin.map(|mut stdin| {
        thread::spawn(move || {
            if let Err(e) = stdin.write_all(&cfg_json) {
                tracing::debug!(error = %e, "failed to write rootlessport config");
            }
        })
    });
    let captured = stdout.map(capture_stdout);
    if let Some(stderr) = stderr {
        forward_stderr(stderr, &log);
    }

    let program = helper.program();
    let synced = wait_for_sync(
        &mut ready_r,
        helper.child_mut(),
        &mut log,
        ROOTLESSPORT_SYNC_INTERVAL,
        program,
    );
    drop(ready_w);
    if let Some(feeder) = feeder {
        let _ = feeder.join();
    }

    if let Err(err) = synced {
        if let Some(message) = captured.and_then(|c| c.message(STDOUT_GRACE)) {
            tracing::debug!(error = %err, "rootlessport failed");
            return Err(RootnetError::HelperMessage {
                program: program.to_string(),
                message,
            });
        }
        return Err(err);
    }

    tracing::debug!(pid = helper.pid(), "rootlessport is ready");
    Ok(RootlessPort {
        pid: helper.pid(),
        exit_fd: exit_w,
    })
}

/// Bounded copy of a child's stdout, filled from a reader thread.
struct CapturedOutput {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Waiter,
}

impl CapturedOutput {
    /// Text captured so far, waiting up to `grace` for end of stream.
    fn message(&self, grace: Duration) -> Option<String> {
        let _ = self.done.wait_timeout(grace);
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        let text = String::from_utf8_lossy(&buf);
        let text = text.strip_suffix('\n').unwrap_or(&text);
        (!text.is_empty()).then(|| text.to_string())
    }
}

fn capture_stdout(mut stdout: ChildStdout) -> CapturedOutput {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let (finished, done) = latch();
    let sink = Arc::clone(&buf);
    let spawned = thread::Builder::new()
        .name("rootlessport-stdout".into())
        .spawn(move || {
            let mut chunk = [0u8; 512];
            loop {
                match stdout.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let mut buf = sink.lock().unwrap_or_else(PoisonError::into_inner);
                        let room = STDOUT_LIMIT.saturating_sub(buf.len());
                        buf.extend_from_slice(&chunk[..n.min(room)]);
                    }
                }
            }
            finished.release();
        });
    if let Err(e) = spawned {
        tracing::debug!(error = %e, "not capturing rootlessport stdout");
    }
    CapturedOutput { buf, done }
}

/// Copies the relay's stderr into its log file and the debug log for as
/// long as the relay keeps it open.
fn forward_stderr(stderr: ChildStderr, log: &File) {
    let mut log = match log.try_clone() {
        Ok(log) => Some(log),
        Err(e) => {
            tracing::debug!(error = %e, "rootlessport stderr not copied to log file");
            None
        }
    };
    let spawned = thread::Builder::new()
        .name("rootlessport-stderr".into())
        .spawn(move || {
            for line in BufReader::new(stderr).lines() {
                let Ok(line) = line else { return };
                if let Some(file) = log.as_mut() {
                    let _ = writeln!(file, "{line}");
                }
                tracing::debug!(target: "rootlessport", "{line}");
            }
        });
    if let Err(e) = spawned {
        tracing::debug!(error = %e, "not forwarding rootlessport stderr");
    }
}
