//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries the
//! storage, runner, and executor sections. Every section defaults sensibly so
//! a completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub runner: RunnerConfig,
    pub executors: ExecutorsConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    ///
    /// String-based so the caller decides how the file is read.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.storage.media_root.as_os_str().is_empty() {
            warnings.push("storage.media_root is empty; artifacts land in the working directory".into());
        }

        if self.runner.worker_id.trim().is_empty() {
            warnings.push("runner.worker_id is empty".into());
        }

        if self.runner.lock_lease_secs < 60 {
            warnings.push(format!(
                "runner.lock_lease_secs is {}; a running step may lose its lease to another worker",
                self.runner.lock_lease_secs
            ));
        }

        for (i, cmd) in self.executors.exec.allowed_commands.iter().enumerate() {
            if cmd.trim().is_empty() {
                warnings.push(format!("executors.exec.allowed_commands[{i}] is empty"));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Where state and artifacts live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Root directory holding every project's data area.
    pub media_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("upload-studio.db"),
            media_root: PathBuf::from("media"),
        }
    }
}

/// Steps runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Identifier written into the project lease while this process runs a step.
    pub worker_id: String,
    /// Age after which a held project lease is treated as abandoned.
    pub lock_lease_secs: u64,
}

impl RunnerConfig {
    pub fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.lock_lease_secs)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("upload-studio-{}", std::process::id()),
            lock_lease_secs: default_lock_lease(),
        }
    }
}

fn default_lock_lease() -> u64 {
    6 * 60 * 60
}

/// Settings for the built-in executors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorsConfig {
    pub exec: ExecConfig,
}

/// Settings for the `exec` executor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Commands the `exec` executor may launch. Empty allows any command.
    pub allowed_commands: Vec<String>,
}
