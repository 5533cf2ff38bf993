//! # rootnet-core
//!
//! Low-level building blocks for bootstrapping rootless container networking.
//!
//! This crate provides safe abstractions over:
//! - **Addresses**: offset arithmetic inside the slirp4netns subnet.
//! - **Latches**: one-shot signals used to order work across threads.
//! - **Namespaces**: temporarily entering an existing network namespace.
//! - **Processes**: inherited-descriptor plumbing, the readiness pipe
//!   handshake, helper process ownership and background reaping.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! proper error handling and `// SAFETY:` documentation.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod addr;
pub mod latch;
pub mod namespace;
pub mod process;
