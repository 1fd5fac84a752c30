//! Configuration loading.
//!
//! The configuration types live in [`us_core::config`]; this module finds
//! the file, parses it and expands `~` in storage paths.

pub use us_core::config::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Locations searched, in order, when no `--config` is given.
pub const DEFAULT_PATHS: [&str; 3] = [
    "./upload-studio.toml",
    "~/.config/upload-studio/config.toml",
    "/etc/upload-studio/config.toml",
];

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config = Config::from_toml(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    for warning in config.validate() {
        tracing::warn!("{}: {}", path.display(), warning);
    }

    expand_paths(&mut config);
    Ok(config)
}

/// Load config from default locations or return the default config.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {}", path.display());
            return load_config(path);
        }
    }

    let mut config = Config::default();
    expand_paths(&mut config);
    Ok(config)
}

fn expand_paths(config: &mut Config) {
    config.storage.db_path = expand(&config.storage.db_path);
    config.storage.media_root = expand(&config.storage.media_root);
}

fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studio.toml");
        std::fs::write(
            &path,
            r#"
[storage]
db_path = "/var/lib/upload-studio/studio.db"

[runner]
worker_id = "box-1"
lock_lease_secs = 600
"#,
        )
        .unwrap();

        let config = load_config_or_default(Some(&path)).unwrap();
        assert_eq!(
            config.storage.db_path,
            PathBuf::from("/var/lib/upload-studio/studio.db")
        );
        assert_eq!(config.runner.worker_id, "box-1");
        assert_eq!(config.runner.lock_lease_secs, 600);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[runner\nworker_id = 1").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn tilde_is_expanded() {
        let mut config = Config::default();
        config.storage.media_root = PathBuf::from("~/uploads");
        expand_paths(&mut config);
        assert!(!config.storage.media_root.starts_with("~"));
    }
}
