use std::fs;
use std::path::{Path, PathBuf};

use crate::model::config::ClientConfig;

/// Environment variable that overrides `api.base_url`
pub const API_BASE_ENV: &str = "ANYTODO_API_BASE";

/// Error type for loading the client configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Default config file path, respecting XDG_CONFIG_HOME
pub fn config_path() -> PathBuf {
    let config_dir = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_home().join(".config"));
    config_dir.join("anytodo").join("config.toml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/"))
}

/// Read the config from `path`. A missing file yields the defaults;
/// an unreadable or malformed one is an error.
pub fn read_config_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let text = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load the effective config: file (explicit or default path), then the
/// environment override, then the command-line override.
pub fn load_config(
    explicit_path: Option<&Path>,
    api_override: Option<&str>,
) -> Result<ClientConfig, ConfigError> {
    let path = explicit_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_path);
    let mut config = read_config_from(&path)?;
    let env_base = std::env::var(API_BASE_ENV).ok();
    apply_base_url_overrides(&mut config, env_base.as_deref(), api_override);
    Ok(config)
}

/// `flag` wins over `env`, which wins over the file. Blank values are ignored.
pub fn apply_base_url_overrides(config: &mut ClientConfig, env: Option<&str>, flag: Option<&str>) {
    for candidate in [env, flag].into_iter().flatten() {
        if !candidate.trim().is_empty() {
            config.api.base_url = candidate.trim().to_string();
        }
    }
}
