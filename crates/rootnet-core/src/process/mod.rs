//! Helper process plumbing.
//!
//! Network helpers are long-lived children that talk to the runtime
//! through inherited descriptors: they watch an exit pipe to know when to
//! stop and write to a ready pipe once they are serving. This module
//! wires those descriptors into the child, waits for the ready signal and
//! hands finished children to a reaper.

pub mod fd;
pub mod helper;
pub mod reaper;
pub mod sync;

use std::fs::File;
use std::os::fd::OwnedFd;

use rootnet_common::error::{Result, RootnetError};

/// Creates a close-on-exec pipe and returns `(read, write)`.
///
/// # Errors
///
/// Returns an error if `pipe2(2)` fails.
pub fn cloexec_pipe() -> Result<(File, OwnedFd)> {
    let (read, write) = nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
        .map_err(|e| RootnetError::syscall("pipe2", e))?;
    Ok((File::from(read), write))
}
