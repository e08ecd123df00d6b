//! Value sources for [`load_and_apply`](crate::load_and_apply): a project
//! `.env` file and the XDG `config.toml` `[env]` table. Both are parsed into
//! plain maps; the merge and the environment writes happen in `lib.rs`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// `[env]` table of `~/.config/<app>/config.toml`; other tables are ignored.
#[derive(Debug, Default, Deserialize)]
struct ConfigToml {
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Reads the `[env]` table from the XDG config file. A missing file yields an
/// empty map; an unreadable or unparsable file is an error.
pub(crate) fn xdg_env_table(app_name: &str) -> Result<HashMap<String, String>, crate::LoadError> {
    let Some(base) = dirs::config_dir() else {
        return Ok(HashMap::new());
    };
    let path = base.join(app_name).join("config.toml");
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(&path).map_err(crate::LoadError::TomlRead)?;
    let parsed: ConfigToml = toml::from_str(&content)?;
    Ok(parsed.env)
}

/// Reads `.env` from `override_dir` (or the current directory) into a map.
/// Missing file yields an empty map.
pub(crate) fn env_file(override_dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    let dir = match override_dir {
        Some(d) => d.to_path_buf(),
        None => match std::env::current_dir() {
            Ok(d) => d,
            Err(_) => return Ok(HashMap::new()),
        },
    };
    let path = dir.join(".env");
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    Ok(parse_env_file(&std::fs::read_to_string(path)?))
}

/// `KEY=VALUE` lines; `#` comment lines and blank lines are skipped; values
/// may be single- or double-quoted (double quotes support `\"`).
fn parse_env_file(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let raw = raw.trim();
        let value = if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
            raw[1..raw.len() - 1].replace("\\\"", "\"")
        } else if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
            raw[1..raw.len() - 1].to_string()
        } else {
            raw.to_string()
        };
        vars.insert(key.to_string(), value);
    }
    vars
}
