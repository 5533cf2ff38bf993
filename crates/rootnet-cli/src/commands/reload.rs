//! `rnet reload` - Point a running rootlessport at a new address.

use clap::Args;
use rootnet_common::config::RuntimeConfig;
use rootnet_common::types::ContainerId;
use rootnet_runtime::portfwd::reload::{reload_socket_path, send_child_ip};

/// Arguments for the `reload` command.
#[derive(Args, Debug)]
pub struct ReloadArgs {
    /// Container whose relay is reloaded.
    #[arg(long)]
    pub container_id: String,

    /// New container address the relay forwards to.
    #[arg(long)]
    pub child_ip: String,
}

/// Executes the `reload` command.
///
/// # Errors
///
/// Returns an error if the relay is unreachable or rejects the address.
pub fn execute(config: &RuntimeConfig, args: ReloadArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.container_id);
    let socket = reload_socket_path(&config.tmp_dir, &id);
    send_child_ip(&socket, &args.child_ip)?;
    tracing::info!(container = %id, child_ip = %args.child_ip, "rootlessport reloaded");
    Ok(())
}
