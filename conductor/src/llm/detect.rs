//! Zero-config provider detection.
//!
//! Reports which vendors have credentials in the current environment, in the
//! table's priority order. Used only to assemble a default chain at boot
//! when no explicit chain is configured; runtime failover always follows
//! the explicit chain order. Detection is read-only with respect to the
//! process environment.

use super::providers::{self, ProviderSpec};

/// One vendor found to be usable from the current environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedProvider {
    pub alias: &'static str,
    /// Environment variable that made this provider eligible, when any.
    pub key_env: Option<&'static str>,
}

/// Scans the environment for configured providers.
///
/// A keyed vendor is detected when its key variable is set and non-empty; a
/// keyless vendor (ollama) is detected only when its base-URL override is
/// set, since a default localhost endpoint existing cannot be assumed.
pub fn detect_providers() -> Vec<DetectedProvider> {
    providers::PROVIDERS
        .iter()
        .filter(|spec| is_configured(spec))
        .map(|spec| DetectedProvider {
            alias: spec.alias,
            key_env: spec.key_env,
        })
        .collect()
}

fn is_configured(spec: &ProviderSpec) -> bool {
    match spec.key_env {
        Some(var) => std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false),
        None => std::env::var(providers::base_url_env(spec.alias))
            .map(|v| !v.is_empty())
            .unwrap_or(false),
    }
}
