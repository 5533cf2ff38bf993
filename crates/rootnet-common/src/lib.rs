//! # rootnet-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the rootnet workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and holds the vocabulary (container IDs, port mappings,
//! network status) that the callers of the network bootstrap speak.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
