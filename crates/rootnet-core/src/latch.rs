//! One-shot latches.
//!
//! A latch starts closed and is opened exactly once by its [`Releaser`].
//! Any number of [`Waiter`]s block until it opens. Dropping the releaser
//! opens the latch too, so waiters are never stranded by an early return
//! or a panic on the releasing side.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Inner {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Inner {
    fn open(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        *open = true;
        self.cond.notify_all();
    }
}

/// Creates a closed latch.
#[must_use]
pub fn latch() -> (Releaser, Waiter) {
    let inner = Arc::new(Inner::default());
    (
        Releaser {
            inner: Arc::clone(&inner),
        },
        Waiter { inner },
    )
}

/// Opening side of a latch.
#[derive(Debug)]
pub struct Releaser {
    inner: Arc<Inner>,
}

impl Releaser {
    /// Opens the latch.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Releaser {
    fn drop(&mut self) {
        self.inner.open();
    }
}

/// Waiting side of a latch.
#[derive(Debug, Clone)]
pub struct Waiter {
    inner: Arc<Inner>,
}

impl Waiter {
    /// Blocks until the latch opens.
    pub fn wait(&self) {
        let open = self.inner.open.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = self
            .inner
            .cond
            .wait_while(open, |open| !*open)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Blocks until the latch opens or `timeout` elapses.
    ///
    /// Returns whether the latch is open.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let open = self.inner.open.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .inner
            .cond
            .wait_timeout_while(open, timeout, |open| !*open)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn starts_closed() {
        let (_releaser, waiter) = latch();
        assert!(!waiter.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn release_wakes_all_waiters() {
        let (releaser, waiter) = latch();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let w = waiter.clone();
                thread::spawn(move || w.wait())
            })
            .collect();
        releaser.release();
        for h in handles {
            h.join().unwrap();
        }
        assert!(waiter.wait_timeout(Duration::ZERO));
    }

    #[test]
    fn dropping_releaser_opens_latch() {
        let (releaser, waiter) = latch();
        let t = thread::spawn(move || {
            let _r = releaser;
        });
        t.join().unwrap();
        assert!(waiter.wait_timeout(Duration::from_secs(1)));
    }
}
