//! Static table of OpenAI-compatible providers.
//!
//! One adapter serves every vendor here; the table carries each vendor's
//! default chat-completions base URL and the environment variable holding its
//! API key. Base URLs can be overridden per provider with
//! `<PROVIDER>_BASE_URL`.

/// Wire-level facts about one OpenAI-compatible vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSpec {
    /// Short name used in config and model-alias keys (`openai`, `groq`, ...).
    pub alias: &'static str,
    /// Default base URL, up to but excluding `/chat/completions`.
    pub base_url: &'static str,
    /// Environment variable carrying the API key; `None` for keyless local
    /// endpoints (ollama).
    pub key_env: Option<&'static str>,
}

/// Known vendors, in the order used for zero-config detection.
pub(crate) const PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        alias: "openai",
        base_url: "https://api.openai.com/v1",
        key_env: Some("OPENAI_API_KEY"),
    },
    ProviderSpec {
        alias: "groq",
        base_url: "https://api.groq.com/openai/v1",
        key_env: Some("GROQ_API_KEY"),
    },
    ProviderSpec {
        alias: "deepseek",
        base_url: "https://api.deepseek.com/v1",
        key_env: Some("DEEPSEEK_API_KEY"),
    },
    ProviderSpec {
        alias: "together",
        base_url: "https://api.together.xyz/v1",
        key_env: Some("TOGETHER_API_KEY"),
    },
    ProviderSpec {
        alias: "xai",
        base_url: "https://api.x.ai/v1",
        key_env: Some("XAI_API_KEY"),
    },
    ProviderSpec {
        alias: "qwen",
        base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        key_env: Some("QWEN_API_KEY"),
    },
    ProviderSpec {
        alias: "ollama",
        base_url: "http://localhost:11434/v1",
        key_env: None,
    },
];

/// Looks up a vendor by alias. Unknown aliases return `None`; an empty alias
/// means `openai`.
pub fn provider_spec(alias: &str) -> Option<&'static ProviderSpec> {
    let alias = if alias.is_empty() { "openai" } else { alias };
    PROVIDERS.iter().find(|p| p.alias == alias)
}

/// Name of the base-URL override variable for a provider (`OPENAI_BASE_URL`).
pub(crate) fn base_url_env(alias: &str) -> String {
    format!("{}_BASE_URL", alias.to_uppercase())
}
