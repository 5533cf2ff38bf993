//! Temporary IPv6 duplicate address detection override.
//!
//! DAD delays IPv6 on a new interface by a second or two. The helper's tap
//! device never shares its link, so DAD is switched off in the target
//! namespace before the helper starts and the original value is put back
//! once the helper is ready or has failed. Nothing here ever fails setup:
//! errors are logged and the override is skipped.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use rootnet_common::constants::IPV6_ACCEPT_DAD_SYSCTL;
use rootnet_common::error::RootnetError;
use rootnet_core::latch::{Releaser, Waiter, latch};
use rootnet_core::namespace::network::with_netns_path;

/// Keeps DAD disabled in a namespace until dropped.
#[derive(Debug)]
pub struct DadGuard {
    helper_ready: Option<Releaser>,
    thread: Option<JoinHandle<()>>,
}

impl DadGuard {
    /// Disables DAD in the network namespace at `netns`.
    ///
    /// Returns once the sysctl has been written (or found missing), so the
    /// helper can be started right after.
    #[must_use]
    pub fn spawn(netns: &Path) -> Self {
        Self::spawn_at(Some(netns.to_path_buf()), PathBuf::from(IPV6_ACCEPT_DAD_SYSCTL))
    }

    /// Like [`DadGuard::spawn`] for an arbitrary sysctl file; `None` stays
    /// in the current namespace.
    pub(crate) fn spawn_at(netns: Option<PathBuf>, sysctl: PathBuf) -> Self {
        let (netns_ready, netns_waiter) = latch();
        let (helper_ready, helper_waiter) = latch();

        let spawned = thread::Builder::new()
            .name("rootnet-dad".into())
            .spawn(move || {
                let result = match &netns {
                    Some(path) => with_netns_path(path, || {
                        override_sysctl(&sysctl, netns_ready, &helper_waiter)
                    })
                    .and_then(|r| r.map_err(|e| io_error(&sysctl, e))),
                    None => override_sysctl(&sysctl, netns_ready, &helper_waiter)
                        .map_err(|e| io_error(&sysctl, e)),
                };
                if let Err(e) = result {
                    tracing::warn!(error = %e, "failed to set net.ipv6.conf.default.accept_dad sysctl");
                }
            });

        let thread = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "failed to start DAD thread, leaving accept_dad alone");
                None
            }
        };

        // The closure owned the releaser, so a failed spawn or an early
        // return both open this latch.
        netns_waiter.wait();

        Self {
            helper_ready: Some(helper_ready),
            thread,
        }
    }

    /// Signals that the helper is ready (or failed) and waits for the
    /// original value to be restored.
    pub fn finish(self) {
        drop(self);
    }
}

impl Drop for DadGuard {
    fn drop(&mut self) {
        if let Some(releaser) = self.helper_ready.take() {
            releaser.release();
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::warn!("DAD thread panicked");
            }
        }
    }
}

fn override_sysctl(sysctl: &Path, netns_ready: Releaser, helper_ready: &Waiter) -> std::io::Result<()> {
    let original = match std::fs::read(sysctl) {
        Ok(value) => value,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            netns_ready.release();
            tracing::debug!(sysctl = %sysctl.display(), "IPv6 disabled on host, leaving DAD alone");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let written = std::fs::write(sysctl, b"0");
    netns_ready.release();
    written?;
    tracing::debug!(sysctl = %sysctl.display(), "disabled DAD");

    helper_ready.wait();
    std::fs::write(sysctl, &original)?;
    tracing::debug!(sysctl = %sysctl.display(), "restored DAD");
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> RootnetError {
    RootnetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_zero_while_held_and_restored_after() {
        let dir = tempfile::tempdir().unwrap();
        let sysctl = dir.path().join("accept_dad");
        std::fs::write(&sysctl, "1\n").unwrap();

        let guard = DadGuard::spawn_at(None, sysctl.clone());
        assert_eq!(std::fs::read_to_string(&sysctl).unwrap(), "0");
        guard.finish();
        assert_eq!(std::fs::read_to_string(&sysctl).unwrap(), "1\n");
    }

    #[test]
    fn missing_sysctl_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let sysctl = dir.path().join("accept_dad");

        let guard = DadGuard::spawn_at(None, sysctl.clone());
        drop(guard);
        assert!(!sysctl.exists());
    }

    #[test]
    fn unwritable_sysctl_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        // A directory reads and writes with an error other than NotFound.
        let guard = DadGuard::spawn_at(None, dir.path().to_path_buf());
        drop(guard);
    }

    #[test]
    fn missing_namespace_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let guard = DadGuard::spawn_at(Some(dir.path().join("no-netns")), dir.path().join("accept_dad"));
        drop(guard);
        assert!(!dir.path().join("accept_dad").exists());
    }
}
