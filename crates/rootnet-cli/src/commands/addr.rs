//! `rnet addr` - Print the well-known slirp4netns addresses.

use clap::Args;
use rootnet_core::addr;

/// Arguments for the `addr` command.
#[derive(Args, Debug)]
pub struct AddrArgs {
    /// Subnet passed to slirp4netns; defaults to 10.0.2.0/24.
    #[arg(long)]
    pub cidr: Option<String>,
}

/// Executes the `addr` command.
///
/// # Errors
///
/// Returns an error if the CIDR is invalid or too small to hold the
/// well-known offsets.
pub fn execute(args: AddrArgs) -> anyhow::Result<()> {
    let subnet = args.cidr.as_deref().map(addr::parse_ipv4_cidr).transpose()?;
    let subnet = subnet.as_ref();

    let rows = [
        ("guest", addr::slirp_ip(subnet)?),
        ("gateway", addr::slirp_gateway(subnet)?),
        ("dns", addr::slirp_dns(subnet)?),
    ];
    #[allow(clippy::print_stdout)]
    for (name, ip) in rows {
        println!("{name:<8} {ip}");
    }
    Ok(())
}
