//! Reaping of detached helper processes.
//!
//! Helpers outlive the setup call that started them. When the runtime
//! stops tracking one, its PID is registered with a [`Reaper`] so the
//! exit status is eventually collected and no zombie is left behind.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

/// Collects exit statuses of processes the runtime released.
pub trait Reaper: Send + Sync {
    /// Takes responsibility for collecting `pid`'s exit status.
    fn register(&self, pid: u32);
}

/// Reaper that polls registered PIDs from a background thread.
#[derive(Debug)]
pub struct PollingReaper {
    pending: Arc<Mutex<Vec<Pid>>>,
}

impl PollingReaper {
    /// Starts a reaper polling every `interval`.
    ///
    /// The polling thread stops once the reaper is dropped.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        let pending = Arc::new(Mutex::new(Vec::new()));
        let weak = Arc::downgrade(&pending);
        let spawned = thread::Builder::new()
            .name("rootnet-reaper".into())
            .spawn(move || poll_loop(&weak, interval));
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "failed to start reaper thread, reaping on demand only");
        }
        Self { pending }
    }

    /// Number of registered PIDs not yet reaped.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Runs one reaping pass and returns how many PIDs were collected.
    pub fn reap_now(&self) -> usize {
        reap_pass(&mut lock(&self.pending))
    }
}

impl Reaper for PollingReaper {
    fn register(&self, pid: u32) {
        let Ok(raw) = i32::try_from(pid) else {
            tracing::warn!(pid, "pid out of range, not reaping");
            return;
        };
        lock(&self.pending).push(Pid::from_raw(raw));
        tracing::debug!(pid, "registered child for reaping");
    }
}

fn lock(pending: &Mutex<Vec<Pid>>) -> std::sync::MutexGuard<'_, Vec<Pid>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn poll_loop(pending: &Weak<Mutex<Vec<Pid>>>, interval: Duration) {
    loop {
        thread::sleep(interval);
        let Some(pending) = pending.upgrade() else {
            return;
        };
        let _ = reap_pass(&mut lock(&pending));
    }
}

fn reap_pass(pending: &mut Vec<Pid>) -> usize {
    let before = pending.len();
    pending.retain(|pid| match waitpid(*pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) => true,
        Ok(status) => {
            tracing::debug!(pid = pid.as_raw(), ?status, "reaped child");
            false
        }
        Err(Errno::EINTR) => true,
        Err(e) => {
            tracing::debug!(pid = pid.as_raw(), error = %e, "child already gone");
            false
        }
    });
    before - pending.len()
}

#[cfg(test)]
mod tests {
    use std::process::Command;
    use std::time::Instant;

    use super::*;

    #[test]
    fn exited_child_is_reaped() {
        let reaper = PollingReaper::new(Duration::from_secs(3600));
        let child = Command::new("/bin/sh").args(["-c", "exit 0"]).spawn().unwrap();
        reaper.register(child.id());
        drop(child);

        let deadline = Instant::now() + Duration::from_secs(5);
        while reaper.pending() > 0 && Instant::now() < deadline {
            let _ = reaper.reap_now();
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(reaper.pending(), 0);
    }

    #[test]
    fn running_child_stays_pending() {
        let reaper = PollingReaper::new(Duration::from_secs(3600));
        let mut child = Command::new("/bin/sh").args(["-c", "sleep 5"]).spawn().unwrap();
        reaper.register(child.id());
        assert_eq!(reaper.reap_now(), 0);
        assert_eq!(reaper.pending(), 1);
        child.kill().unwrap();
        let _ = child.wait();
        // Already collected by `wait`, so the next pass drops it on ECHILD.
        assert_eq!(reaper.reap_now(), 1);
    }

    #[test]
    fn background_thread_reaps() {
        let reaper = PollingReaper::new(Duration::from_millis(10));
        let child = Command::new("/bin/sh").args(["-c", "exit 0"]).spawn().unwrap();
        reaper.register(child.id());
        drop(child);
        let deadline = Instant::now() + Duration::from_secs(5);
        while reaper.pending() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(reaper.pending(), 0);
    }
}
