//! Waiting for files created by helpers.

use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use rootnet_common::constants::API_SOCKET_POLL_INTERVAL;
use rootnet_common::error::{Result, RootnetError};

/// Blocks until `path` exists, an error arrives on `abort`, or `timeout`
/// elapses.
///
/// # Errors
///
/// Returns the first error received on `abort`, or
/// [`RootnetError::Timeout`] once `timeout` has elapsed.
pub fn wait_for_file(path: &Path, abort: &Receiver<RootnetError>, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if path.exists() {
            tracing::debug!(path = %path.display(), "file appeared");
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(RootnetError::Timeout {
                what: path.display().to_string(),
                after: timeout,
            });
        }
        match abort.recv_timeout(API_SOCKET_POLL_INTERVAL) {
            Ok(err) => return Err(err),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => std::thread::sleep(API_SOCKET_POLL_INTERVAL),
        }
    }
}
