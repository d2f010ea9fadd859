// src/config.rs

//! Configuration loading utilities.
//!
//! Every command reads `config.toml` and `credentials.toml` from one
//! configuration directory.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::{Config, Credentials, default_config_dir};

pub const CONFIG_FILE: &str = "config.toml";
pub const CREDENTIALS_FILE: &str = "credentials.toml";

/// The given directory, or the per-user default.
pub fn resolve_config_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir.to_path_buf()),
        None => default_config_dir()
            .ok_or_else(|| AppError::config("Cannot determine a config directory; pass --config-dir")),
    }
}

/// Load and validate `config.toml`, using defaults when it is absent.
pub fn load_config(config_dir: &Path) -> Result<Config> {
    let config = Config::load_or_default(config_dir.join(CONFIG_FILE))?;
    config.validate()?;
    Ok(config)
}

pub fn load_credentials(config_dir: &Path) -> Result<Credentials> {
    Credentials::load(config_dir.join(CREDENTIALS_FILE))
}

/// Load both configuration files.
pub fn load_all(config_dir: &Path) -> Result<(Config, Credentials)> {
    let config = load_config(config_dir)?;
    let credentials = load_credentials(config_dir)?;
    Ok((config, credentials))
}
