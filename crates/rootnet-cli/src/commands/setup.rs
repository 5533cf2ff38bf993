//! `rnet setup` - Attach slirp4netns to a namespace and publish ports.
//!
//! The helpers stay up for as long as this command runs; Ctrl+C closes
//! their exit pipes and they shut down.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Args;
use rootnet_common::config::RuntimeConfig;
use rootnet_common::error::RootnetError;
use rootnet_common::types::{ContainerId, PortMapping};
use rootnet_core::process::reaper::PollingReaper;
use rootnet_runtime::slirp::{NetnsTarget, SlirpRequest, setup_slirp4netns};

use crate::output::{self, BOLD, DIM, GREEN, RESET};

/// Arguments for the `setup` command.
#[derive(Args, Debug)]
pub struct SetupArgs {
    /// Container identifier, used to name logs and sockets.
    #[arg(long)]
    pub container_id: String,

    /// Path of a pre-created network namespace.
    #[arg(long, conflicts_with = "pid", required_unless_present = "pid")]
    pub netns: Option<PathBuf>,

    /// PID of a running process whose network namespace is configured.
    #[arg(long)]
    pub pid: Option<u32>,

    /// Port to publish: `[ip:]host[-end]:container[-end][/tcp,udp]`.
    #[arg(short, long = "publish")]
    pub publish: Vec<PortMapping>,

    /// slirp4netns option `key=value`; may be repeated.
    #[arg(short, long = "opt")]
    pub opt: Vec<String>,
}

/// Executes the `setup` command.
///
/// # Errors
///
/// Returns an error if the network cannot be set up or the Ctrl+C handler
/// cannot be installed.
#[allow(clippy::print_stderr)]
pub fn execute(config: &RuntimeConfig, args: SetupArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.container_id);
    let netns = match (args.netns, args.pid) {
        (Some(path), _) => NetnsTarget::Path(path),
        (None, Some(pid)) => NetnsTarget::Pid(pid),
        (None, None) => anyhow::bail!("either --netns or --pid is required"),
    };

    let reaper = Arc::new(PollingReaper::new(Duration::from_secs(1)));
    let setup = setup_slirp4netns(
        config,
        &SlirpRequest {
            container_id: &id,
            port_mappings: &args.publish,
            network_options: &args.opt,
            netns,
        },
        reaper,
    );
    let network = match setup {
        Ok(network) => network,
        Err(e) => {
            // Dropping the error closes the helper's exit pipe.
            if let RootnetError::HelperLeftRunning { program, pid, .. } = &e {
                tracing::warn!(program = %program, pid, "stopping helper after failed setup");
            }
            anyhow::bail!("{}", e.root_cause());
        }
    };

    eprintln!();
    eprintln!("  {GREEN}{BOLD}slirp4netns ready{RESET} {DIM}[pid {}]{RESET}", network.pid);
    eprint!("{}", output::network_summary(&network));
    eprintln!();
    eprintln!("  Press {BOLD}Ctrl+C{RESET} to tear down...");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(250));
    }

    drop(network);
    eprintln!("  {GREEN}Network helpers stopped.{RESET}");
    Ok(())
}
