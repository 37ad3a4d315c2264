//! File system paths for the Knugget client.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Bridge socket filename under the base runtime directory.
const BRIDGE_SOCKET_NAME: &str = "bridge.sock";

/// Manages file system paths for the client.
///
/// Everything lives under one base directory (`~/.knugget` by default) so a
/// single `rm -rf` resets the client to a logged-out, unconfigured state.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for client runtime files (~/.knugget)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.knugget`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".knugget"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.knugget).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.knugget/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the persisted session file path (~/.knugget/session.json).
    pub fn session_file(&self) -> PathBuf {
        self.base_dir.join("session.json")
    }

    /// Get the extension bridge socket path (~/.knugget/bridge.sock).
    pub fn bridge_socket_file(&self) -> PathBuf {
        self.base_dir.join(BRIDGE_SOCKET_NAME)
    }

    /// Get the logs directory (~/.knugget/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the central log file path (~/.knugget/logs/knugget.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("knugget.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new().expect("Failed to determine home directory")
    }
}
