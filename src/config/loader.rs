// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::RundagConfig;
use crate::config::validate::validate_config;
use crate::errors::ConfigError;

/// Load a configuration file from a given path and return the raw
/// `RundagConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RundagConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse_str(&contents)
}

/// Parse TOML text into a `RundagConfig`.
pub fn parse_str(contents: &str) -> Result<RundagConfig, ConfigError> {
    Ok(toml::from_str(contents)?)
}

/// Load a configuration file from path and run validation.
///
/// This is the recommended entry point:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks numeric bounds and duration strings.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<RundagConfig, ConfigError> {
    let config = load_from_path(&path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Default config location: `Rundag.toml` in the current working directory,
/// unless `RUNDAG_CONFIG` points elsewhere.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("RUNDAG_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Rundag.toml"))
}
