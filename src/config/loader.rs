//! Configuration loading and saving utilities.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::schema::Config;
use crate::utils::ensure_dir;

/// Get the default configuration file path (`~/.voxloop/config.json`).
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Get the voxloop data directory (`~/.voxloop`).
pub fn get_data_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    ensure_dir(home.join(".voxloop"))
}

/// Load configuration from a file, or return a default [`Config`] if the
/// file does not exist or cannot be parsed.
///
/// If `config_path` is `None`, the default path (`~/.voxloop/config.json`)
/// is used.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => get_config_path(),
    };

    if path.exists() {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Config>(&contents) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        "Failed to parse config from {}: {}. Using default configuration.",
                        path.display(),
                        e
                    );
                }
            },
            Err(e) => {
                warn!(
                    "Failed to read config from {}: {}. Using default configuration.",
                    path.display(),
                    e
                );
            }
        }
    }

    Config::default()
}

/// Save configuration to a JSON file.
///
/// If `config_path` is `None`, the default path is used. Parent directories
/// are created if they don't exist.
pub fn save_config(config: &Config, config_path: Option<&Path>) {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => get_config_path(),
    };

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    match serde_json::to_string_pretty(config) {
        Ok(json) => {
            if let Err(e) = fs::write(&path, json) {
                warn!("Failed to write config to {}: {}", path.display(), e);
            }
        }
        Err(e) => {
            warn!("Failed to serialize config: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let path = Path::new("/tmp/voxloop_test_does_not_exist_987654.json");
        let cfg = load_config(Some(path));
        assert_eq!(cfg.latency.budget_ms, 2_000);
    }

    #[test]
    fn test_load_and_save_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tmp_path = dir.path().join("config_roundtrip.json");

        let mut cfg = Config::default();
        cfg.gateway.port = 4242;
        cfg.synthesis.queue_depth = 5;
        save_config(&cfg, Some(&tmp_path));

        let loaded = load_config(Some(&tmp_path));
        assert_eq!(loaded.gateway.port, 4242);
        assert_eq!(loaded.synthesis.queue_depth, 5);
        assert_eq!(loaded.reasoning.model, cfg.reasoning.model);
    }

    #[test]
    fn test_load_corrupt_returns_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tmp_path = dir.path().join("corrupt.json");
        fs::write(&tmp_path, "{not json").unwrap();

        let cfg = load_config(Some(&tmp_path));
        assert_eq!(cfg.session.context_window, 10);
    }
}
