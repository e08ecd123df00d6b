//! Server settings read from the environment.
//!
//! Reads only; call [`crate::load_and_apply`] first so `.env`/`config.toml`
//! values are visible here. Unset or unparsable numeric values fall back to
//! defaults rather than failing boot.

/// Runtime knobs for the conductor server.
#[derive(Debug, Clone)]
pub struct Settings {
    /// HTTP listen port (`PORT`, default 8080).
    pub port: u16,
    /// Redis connection URL (`REDIS_URL`). Required to run the server.
    pub redis_url: Option<String>,
    /// Deployment namespace, used as a key prefix qualifier (`NAMESPACE`).
    pub namespace: Option<String>,
    /// Deployment environment tag (`APP_ENV`, e.g. `dev`, `prod`).
    pub app_env: String,
    /// Sliding-window size per session (`SESSION_MAX_MESSAGES`, default 50).
    pub session_max_messages: usize,
    /// Session inactivity TTL in seconds (`SESSION_TTL_SECS`, default 1800).
    pub session_ttl_secs: u64,
    /// Catalog refresh interval in seconds (`CATALOG_REFRESH_SECS`, default 10).
    pub catalog_refresh_secs: u64,
    /// Consecutive fetch failures before a service is dropped from the
    /// catalog (`CATALOG_FAILURE_THRESHOLD`, default 3).
    pub catalog_failure_threshold: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 8080,
            redis_url: None,
            namespace: None,
            app_env: "dev".to_string(),
            session_max_messages: 50,
            session_ttl_secs: 1800,
            catalog_refresh_secs: 10,
            catalog_failure_threshold: 3,
        }
    }
}

fn parsed_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    /// Builds settings from the current environment. Never writes to it.
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        Settings {
            port: parsed_var("PORT", defaults.port),
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            namespace: std::env::var("NAMESPACE").ok().filter(|v| !v.is_empty()),
            app_env: std::env::var("APP_ENV").unwrap_or(defaults.app_env),
            session_max_messages: parsed_var("SESSION_MAX_MESSAGES", defaults.session_max_messages),
            session_ttl_secs: parsed_var("SESSION_TTL_SECS", defaults.session_ttl_secs),
            catalog_refresh_secs: parsed_var("CATALOG_REFRESH_SECS", defaults.catalog_refresh_secs),
            catalog_failure_threshold: parsed_var(
                "CATALOG_FAILURE_THRESHOLD",
                defaults.catalog_failure_threshold,
            ),
        }
    }
}
