//! Configuration loading and data directory resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// TOML configuration file contents
///
/// All fields are optional; the settings database is the authoritative tier
/// and the TOML file acts as a bootstrap/backup tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data directory override
    pub data_dir: Option<String>,
    /// Host catalog query endpoint, e.g. "http://localhost:9999/graphql"
    pub host_endpoint: Option<String>,
    /// Host API key (sent as ApiKey header when present)
    pub host_api_key: Option<String>,
    /// Log level filter (trace/debug/info/warn/error)
    pub log_level: Option<String>,
}

/// Data directory resolution priority:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_dir(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config) = load_toml_config(&default_config_path()) {
        if let Some(dir) = config.data_dir {
            return PathBuf::from(dir);
        }
    }

    // Priority 4: OS-dependent default
    default_data_dir()
}

/// Default configuration file path for the platform
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("curator").join("curator.toml"))
        .unwrap_or_else(|| PathBuf::from("./curator.toml"))
}

/// OS-dependent default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("curator"))
        .unwrap_or_else(|| PathBuf::from("./curator_data"))
}

/// Load a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write a TOML configuration file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Create config dir failed: {}", e)))?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content).map_err(|e| Error::Config(format!("Write TOML failed: {}", e)))?;
    Ok(())
}

/// Ensure the data directory exists and return the database path inside it
pub fn ensure_data_dir(data_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| Error::Config(format!("Create data dir failed: {}", e)))?;
    Ok(data_dir.join("curator.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_arg_has_highest_priority() {
        let dir = resolve_data_dir(Some("/tmp/curator-test"), "CURATOR_TEST_UNSET_VAR");
        assert_eq!(dir, PathBuf::from("/tmp/curator-test"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("curator.toml");

        let config = TomlConfig {
            data_dir: None,
            host_endpoint: Some("http://localhost:9999/graphql".to_string()),
            host_api_key: Some("secret".to_string()),
            log_level: Some("debug".to_string()),
        };

        write_toml_config(&config, &path).unwrap();
        let loaded = load_toml_config(&path).unwrap();

        assert_eq!(loaded.host_endpoint, config.host_endpoint);
        assert_eq!(loaded.host_api_key, config.host_api_key);
        assert_eq!(loaded.log_level, config.log_level);
    }

    #[test]
    fn test_ensure_data_dir_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = tmp.path().join("nested").join("curator");

        let db_path = ensure_data_dir(&data_dir).unwrap();

        assert!(data_dir.exists());
        assert!(db_path.ends_with("curator.db"));
    }
}
