//! CLI command definitions and dispatch.

pub mod addr;
pub mod probe;
pub mod reload;
pub mod setup;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rootnet_common::config::RuntimeConfig;

/// rootnet - rootless container network bootstrap.
#[derive(Parser, Debug)]
#[command(name = "rnet", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to a JSON runtime configuration file.
    #[arg(long, global = true, env = "RNET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Scratch directory for logs and sockets, overriding the configuration.
    #[arg(long, global = true, env = "RNET_TMPDIR")]
    pub tmp_dir: Option<PathBuf>,
}

impl Cli {
    /// Loads the runtime configuration and applies command-line overrides.
    fn runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let mut config = match &self.config {
            Some(path) => RuntimeConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => RuntimeConfig::default(),
        };
        if let Some(tmp_dir) = &self.tmp_dir {
            config.tmp_dir.clone_from(tmp_dir);
        }
        Ok(config)
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show which optional flags the installed slirp4netns supports.
    Probe(probe::ProbeArgs),
    /// Print the guest, gateway and DNS addresses of a slirp4netns subnet.
    Addr(addr::AddrArgs),
    /// Attach slirp4netns to a network namespace and publish ports.
    Setup(setup::SetupArgs),
    /// Send a new container address to a running rootlessport.
    Reload(reload::ReloadArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.runtime_config()?;
    match cli.command {
        Command::Probe(args) => probe::execute(&config, args),
        Command::Addr(args) => addr::execute(args),
        Command::Setup(args) => setup::execute(&config, args),
        Command::Reload(args) => reload::execute(&config, args),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn setup_requires_a_namespace() {
        assert!(Cli::try_parse_from(["rnet", "setup", "--container-id", "c1"]).is_err());
        assert!(
            Cli::try_parse_from(["rnet", "setup", "--container-id", "c1", "--pid", "1", "--netns", "/x"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["rnet", "setup", "--container-id", "c1", "--pid", "1"]).is_ok());
    }

    #[test]
    fn tmp_dir_flag_overrides_config() {
        let cli = Cli::try_parse_from(["rnet", "--tmp-dir", "/run/rn-test", "addr"]).unwrap();
        assert_eq!(cli.runtime_config().unwrap().tmp_dir, PathBuf::from("/run/rn-test"));
    }
}
