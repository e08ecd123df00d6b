//! Boot-time configuration for conductor.
//!
//! Two concerns, both used once by the `cli` binary before anything else runs:
//!
//! - [`load_and_apply`]: merge a project `.env` and the XDG
//!   `~/.config/conductor/config.toml` `[env]` table into the process
//!   environment, with priority **existing env > .env > config.toml**. This
//!   is the only place in the workspace that writes environment variables;
//!   request-time credential and alias resolution is read-only.
//! - [`Settings`]: the server's own knobs (port, Redis URL, namespaces,
//!   session limits, catalog refresh cadence) read from the environment.

mod settings;
mod sources;

use std::path::Path;

use thiserror::Error;

pub use settings::Settings;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("read config.toml: {0}")]
    TomlRead(std::io::Error),
    #[error("parse config.toml: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    EnvFileRead(std::io::Error),
}

/// Loads `.env` and the XDG `config.toml` `[env]` table, then sets each key
/// that is **not** already present in the process environment.
///
/// Precedence for a key missing from the environment:
/// 1. project `.env` (in `override_dir`, or the current directory)
/// 2. `~/.config/<app_name>/config.toml` `[env]` table
///
/// Keys already set in the environment are never touched.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let toml_vars = sources::xdg_env_table(app_name)?;
    let env_file_vars = sources::env_file(override_dir).map_err(LoadError::EnvFileRead)?;

    let mut keys: std::collections::BTreeSet<String> = toml_vars.keys().cloned().collect();
    keys.extend(env_file_vars.keys().cloned());

    for key in keys {
        if std::env::var(&key).is_ok() {
            continue;
        }
        if let Some(value) = env_file_vars.get(&key).or_else(|| toml_vars.get(&key)) {
            std::env::set_var(&key, value);
        }
    }
    Ok(())
}
