//! # rnet - rootnet CLI
//!
//! Bootstraps rootless container networking by hand: probe the installed
//! slirp4netns, compute its addresses, attach it to a namespace with
//! published ports, or push a new address to a running port relay.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod commands;
mod output;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
