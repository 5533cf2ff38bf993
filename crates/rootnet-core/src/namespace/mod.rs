//! Linux namespace helpers used while bootstrapping container networking.
//!
//! Rootless networking never creates namespaces itself; it joins the
//! container's network namespace to inspect it and checks whether the
//! current process runs without real root.

pub mod network;
pub mod user;
