//! Configuration management
//!
//! Handles switch.toml (user-defined) and switch.lock (generated with all
//! defaults). Both files share one schema, so either can be loaded to run.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    load_str(&content)
}

/// Parse configuration from TOML text
///
/// Unknown mode, role and policy names are rejected here; finer checks are
/// left to `validate`.
pub fn load_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
    config.settings()?;
    Ok(config)
}

/// Generate a lock file from config, filling in all defaults
pub fn generate_lock(config: &Config) -> ConfigLock {
    ConfigLock::from_config(config)
}

/// Render a lock file, with a header naming its source
pub fn render_lock(lock: &ConfigLock, source: &Path) -> Result<String> {
    let body = toml::to_string_pretty(lock).map_err(|e| Error::Config(e.to_string()))?;
    Ok(format!(
        "# Generated by tfe-switch - DO NOT EDIT\n# Source: {}\n\n{}",
        source.display(),
        body
    ))
}
