//! Global configuration model for the network bootstrap.
//!
//! Mirrors the engine-level knobs a container runtime exposes for
//! rootless networking: where scratch files live, which helper binary to
//! run, and which helper options apply to every container.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RootnetError};

/// Runtime-wide configuration consumed by every setup call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Scratch directory for log sinks, API sockets and reload sockets.
    pub tmp_dir: PathBuf,
    /// Explicit slirp4netns binary; looked up when unset.
    pub network_cmd_path: Option<PathBuf>,
    /// `key=value` slirp4netns options applied to every container.
    pub network_cmd_options: Vec<String>,
    /// Whether the runtime avoids `pivot_root` (disables the helper sandbox).
    pub no_pivot_root: bool,
    /// Directories searched for helper binaries before `$PATH`.
    pub helper_binaries_dir: Vec<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tmp_dir: crate::constants::default_tmp_dir(),
            network_cmd_path: None,
            network_cmd_options: Vec::new(),
            no_pivot_root: false,
            helper_binaries_dir: vec![
                PathBuf::from("/usr/local/libexec/podman"),
                PathBuf::from("/usr/local/lib/podman"),
                PathBuf::from("/usr/libexec/podman"),
                PathBuf::from("/usr/lib/podman"),
            ],
        }
    }
}

impl RuntimeConfig {
    /// Loads configuration from a JSON file.
    ///
    /// Fields missing from the file keep their defaults; a missing file
    /// yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(RootnetError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        let config: Self = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded runtime config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = RuntimeConfig::load(&dir.path().join("absent.json")).expect("load");
        assert_eq!(cfg, RuntimeConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rootnet.json");
        std::fs::write(
            &path,
            r#"{"tmp_dir": "/run/user/1000/rn", "network_cmd_options": ["mtu=1500"]}"#,
        )
        .expect("write");

        let cfg = RuntimeConfig::load(&path).expect("load");
        assert_eq!(cfg.tmp_dir, PathBuf::from("/run/user/1000/rn"));
        assert_eq!(cfg.network_cmd_options, vec!["mtu=1500".to_string()]);
        assert!(!cfg.no_pivot_root);
        assert!(cfg.network_cmd_path.is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rootnet.json");
        std::fs::write(&path, "{ not json").expect("write");
        assert!(matches!(
            RuntimeConfig::load(&path),
            Err(RootnetError::Serialization { .. })
        ));
    }
}
