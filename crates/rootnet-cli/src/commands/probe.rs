//! `rnet probe` - Show slirp4netns capabilities.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use rootnet_common::config::RuntimeConfig;
use rootnet_common::constants::SLIRP4NETNS_BINARY_NAME;
use rootnet_runtime::binary::find_helper_binary;
use rootnet_runtime::slirp::features::probe;

use crate::output;

/// Arguments for the `probe` command.
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// slirp4netns binary to probe instead of the configured one.
    #[arg(long)]
    pub binary: Option<PathBuf>,
}

/// Executes the `probe` command.
///
/// # Errors
///
/// Returns an error if no binary is found or it cannot be probed.
pub fn execute(config: &RuntimeConfig, args: ProbeArgs) -> anyhow::Result<()> {
    let binary = match args.binary.or_else(|| config.network_cmd_path.clone()) {
        Some(path) => path,
        None => find_helper_binary(config, SLIRP4NETNS_BINARY_NAME, true)
            .context("could not find slirp4netns")?,
    };
    let features = probe(&binary)?;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", binary.display());
        print!("{}", output::feature_table(&features));
    }
    Ok(())
}
