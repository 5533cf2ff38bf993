//! Readiness barrier for helper processes.
//!
//! A helper signals readiness by writing to its ready pipe. The parent
//! polls the read end with a fixed interval; every time the interval
//! elapses without data it checks whether the helper is still alive. A
//! helper that exited early has its log read back and turned into the
//! startup error.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::os::fd::AsFd;
use std::os::unix::process::ExitStatusExt;
use std::process::Child;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use rootnet_common::error::{Result, RootnetError};

/// Blocks until `child` writes to `ready` or fails.
///
/// The caller must keep its own copy of the write end open until this
/// returns, so that an exiting child shows up through the liveness check
/// rather than as end-of-file.
///
/// # Errors
///
/// - [`RootnetError::Killed`] if the child died from a signal.
/// - [`RootnetError::Startup`] if the child exited, carrying the contents
///   of `log` read from the start.
/// - [`RootnetError::Syscall`] if polling, reading or querying the child
///   status fails.
pub fn wait_for_sync(
    ready: &mut File,
    child: &mut Child,
    log: &mut (impl Read + Seek),
    interval: Duration,
    program: &str,
) -> Result<()> {
    let timeout = u16::try_from(interval.as_millis()).map_or(PollTimeout::MAX, PollTimeout::from);
    let mut buf = [0u8; 16];

    loop {
        let mut fds = [PollFd::new(ready.as_fd(), PollFlags::POLLIN)];
        let readable = match poll(&mut fds, timeout) {
            Ok(n) => n > 0,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(RootnetError::syscall("poll ready pipe", e)),
        };

        if readable {
            match ready.read(&mut buf) {
                Ok(n) if n > 0 => {
                    tracing::debug!(program, pid = child.id(), "helper signalled readiness");
                    return Ok(());
                }
                Ok(_) => {
                    // Every writer is gone; fall through to the liveness
                    // check and pace the loop ourselves.
                    check_alive(child, log, program)?;
                    std::thread::sleep(interval);
                    continue;
                }
                Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
                    continue;
                }
                Err(e) => return Err(RootnetError::syscall("read ready pipe", e)),
            }
        }

        check_alive(child, log, program)?;
    }
}

/// Returns an error describing how `child` ended, or `Ok` if it still runs.
fn check_alive(child: &mut Child, log: &mut (impl Read + Seek), program: &str) -> Result<()> {
    let Some(status) = child
        .try_wait()
        .map_err(|e| RootnetError::syscall("read helper status", e))?
    else {
        tracing::trace!(program, pid = child.id(), "helper not ready yet");
        return Ok(());
    };

    if status.signal().is_some() {
        tracing::warn!(program, pid = child.id(), %status, "helper killed before ready");
        return Err(RootnetError::Killed {
            program: program.to_string(),
        });
    }

    tracing::warn!(program, pid = child.id(), %status, "helper exited before ready");
    Err(RootnetError::Startup {
        program: program.to_string(),
        detail: read_log(log),
    })
}

fn read_log(log: &mut (impl Read + Seek)) -> String {
    let mut raw = Vec::new();
    match log
        .seek(SeekFrom::Start(0))
        .and_then(|_| log.read_to_end(&mut raw))
    {
        Ok(_) => String::from_utf8_lossy(&raw).into_owned(),
        Err(e) => format!("reading log: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::os::fd::AsFd;
    use std::process::{Command, Stdio};

    use super::*;
    use crate::process::{cloexec_pipe, fd::add_pre_exec_hook};

    const TICK: Duration = Duration::from_millis(50);

    fn spawn_sh(script: &str, stdout: Stdio) -> (File, std::os::fd::OwnedFd, Child) {
        let (read, write) = cloexec_pipe().unwrap();
        let mut cmd = Command::new("/bin/sh");
        let _ = cmd.args(["-c", script]).stdout(stdout);
        add_pre_exec_hook(&mut cmd, &[(write.as_fd(), 4)], false);
        let child = cmd.spawn().unwrap();
        (read, write, child)
    }

    #[test]
    fn ready_write_completes_barrier() {
        let (mut read, _write, mut child) = spawn_sh("sleep 0.1; echo 1 >&4; sleep 5", Stdio::null());
        let mut log = Cursor::new(Vec::new());
        wait_for_sync(&mut read, &mut child, &mut log, TICK, "sh").unwrap();
        let _ = child.kill();
        let _ = child.wait();
    }

    #[test]
    fn early_exit_reports_log() {
        let (mut read, _write, mut child) = spawn_sh("exit 1", Stdio::null());
        let mut log = Cursor::new(b"boom: no tun device\n".to_vec());
        log.set_position(20);
        let err = wait_for_sync(&mut read, &mut child, &mut log, TICK, "sh").unwrap_err();
        match err {
            RootnetError::Startup { program, detail } => {
                assert_eq!(program, "sh");
                assert!(detail.contains("boom"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn signal_death_is_reported() {
        let (mut read, _write, mut child) = spawn_sh("kill -9 $$", Stdio::null());
        let mut log = Cursor::new(Vec::new());
        let err = wait_for_sync(&mut read, &mut child, &mut log, TICK, "sh").unwrap_err();
        assert!(matches!(err, RootnetError::Killed { .. }));
        assert_eq!(err.to_string(), "sh killed by signal");
    }

    #[test]
    fn exit_with_writer_gone_is_still_detected() {
        let (mut read, write, mut child) = spawn_sh("exit 3", Stdio::null());
        drop(write);
        let mut log = Cursor::new(b"bad flag".to_vec());
        let err = wait_for_sync(&mut read, &mut child, &mut log, TICK, "sh").unwrap_err();
        assert!(err.to_string().contains("bad flag"));
    }
}
