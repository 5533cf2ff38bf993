//! Descriptor mapping for helper children.
//!
//! Helpers expect their exit pipe on fd 3 and their ready pipe on fd 4.
//! The mapping happens in a `pre_exec` hook, after `fork()` and before the
//! helper starts, so everything here is async-signal-safe: raw syscalls
//! only, no allocation, no locking, no logging.

use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::process::Command;

/// Installs a hook that places each source descriptor at its target slot
/// in the child and optionally gives the child a private mount namespace.
///
/// Sources are first duplicated above every target slot with
/// close-on-exec set, then moved into place with `dup2(2)`, so a source
/// that already sits on a target slot is never clobbered. Targets end up
/// without close-on-exec and survive into the helper.
///
/// The sources must stay open until the command is spawned.
///
/// # Safety
///
/// The hook only uses async-signal-safe syscalls:
/// - `fcntl(F_DUPFD_CLOEXEC)` and `dup2()`
/// - `unshare(CLONE_NEWNS)` and `mount()` when `private_mounts` is set
///
/// **Do NOT add logging, allocation or locking to the hook.**
pub fn add_pre_exec_hook(
    cmd: &mut Command,
    fd_map: &[(BorrowedFd<'_>, RawFd)],
    private_mounts: bool,
) {
    use std::os::unix::process::CommandExt;

    let map: Vec<(RawFd, RawFd)> = fd_map
        .iter()
        .map(|(src, target)| (src.as_raw_fd(), *target))
        .collect();
    let floor = map.iter().map(|(_, t)| *t + 1).max().unwrap_or(0);
    let mut staged: Vec<RawFd> = vec![-1; map.len()];

    // SAFETY: The hook only uses async-signal-safe syscalls and writes
    // into buffers allocated before fork.
    unsafe {
        cmd.pre_exec(move || {
            for (slot, (src, _)) in staged.iter_mut().zip(&map) {
                let fd = libc::fcntl(*src, libc::F_DUPFD_CLOEXEC, floor);
                if fd < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                *slot = fd;
            }
            for (staged_fd, (_, target)) in staged.iter().zip(&map) {
                if libc::dup2(*staged_fd, *target) < 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            if private_mounts {
                make_mounts_private_raw().map_err(std::io::Error::from_raw_os_error)?;
            }
            Ok(())
        });
    }
}

/// Unshares the mount namespace and marks every mount private so the
/// helper can sandbox itself without affecting the parent.
///
/// Async-signal-safe; returns the raw errno on failure.
#[cfg(target_os = "linux")]
fn make_mounts_private_raw() -> Result<(), i32> {
    // SAFETY: plain syscalls with static, NUL-terminated arguments.
    unsafe {
        if libc::unshare(libc::CLONE_NEWNS) != 0 {
            return Err(*libc::__errno_location());
        }
        let rc = libc::mount(
            std::ptr::null(),
            c"/".as_ptr(),
            std::ptr::null(),
            libc::MS_REC | libc::MS_PRIVATE,
            std::ptr::null(),
        );
        if rc != 0 {
            return Err(*libc::__errno_location());
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn make_mounts_private_raw() -> Result<(), i32> {
    Err(libc::ENOSYS)
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::os::fd::AsFd;
    use std::process::Stdio;

    use super::*;
    use crate::process::cloexec_pipe;

    #[test]
    fn source_lands_on_target_slot() {
        let (mut read, write) = cloexec_pipe().unwrap();
        let mut cmd = Command::new("/bin/sh");
        let _ = cmd.args(["-c", "echo mapped >&4"]).stdout(Stdio::null());
        add_pre_exec_hook(&mut cmd, &[(write.as_fd(), 4)], false);

        let mut child = cmd.spawn().unwrap();
        drop(write);
        let mut out = String::new();
        let _ = read.read_to_string(&mut out).unwrap();
        assert!(child.wait().unwrap().success());
        assert_eq!(out.trim(), "mapped");
    }

    #[test]
    fn crossed_slots_do_not_clobber_each_other() {
        // Two pipes whose write ends are swapped on purpose: the write end
        // of `a` goes to 4 and the one of `b` goes to 3.
        let (mut a_read, a_write) = cloexec_pipe().unwrap();
        let (mut b_read, b_write) = cloexec_pipe().unwrap();
        let mut cmd = Command::new("/bin/sh");
        let _ = cmd.args(["-c", "echo a >&4; echo b >&3"]);
        add_pre_exec_hook(&mut cmd, &[(a_write.as_fd(), 4), (b_write.as_fd(), 3)], false);

        let mut child = cmd.spawn().unwrap();
        drop(a_write);
        drop(b_write);
        let (mut a, mut b) = (String::new(), String::new());
        let _ = a_read.read_to_string(&mut a).unwrap();
        let _ = b_read.read_to_string(&mut b).unwrap();
        assert!(child.wait().unwrap().success());
        assert_eq!(a.trim(), "a");
        assert_eq!(b.trim(), "b");
    }
}
