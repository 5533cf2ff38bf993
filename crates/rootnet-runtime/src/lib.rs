//! Rootless network bootstrap for containers.
//!
//! Starts `slirp4netns` for a container network namespace, waits for it to
//! come up, and publishes host ports either through the slirp4netns API
//! socket or through a `rootlessport` relay.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod binary;
pub mod logs;
pub mod portfwd;
pub mod slirp;
pub mod wait;
