//! Model-alias resolution.
//!
//! Callers may name a model by role (`fast`, `smart`, `code`, `vision`,
//! `default`) instead of a concrete id. Resolution is per provider from a
//! compile-time table, with `CONDUCTOR_<PROVIDER>_MODEL_<ALIAS>` environment
//! overrides taking priority. Unknown aliases and unknown providers pass
//! through unchanged; resolution never writes to the environment.

/// Compile-time alias table: `(provider, alias) -> model`.
const MODEL_ALIASES: &[(&str, &str, &str)] = &[
    ("openai", "fast", "gpt-4o-mini"),
    ("openai", "smart", "gpt-4o"),
    ("openai", "code", "gpt-4o"),
    ("openai", "vision", "gpt-4o"),
    ("openai", "default", "gpt-4o-mini"),
    ("groq", "fast", "llama-3.1-8b-instant"),
    ("groq", "smart", "llama-3.3-70b-versatile"),
    ("groq", "code", "llama-3.3-70b-versatile"),
    ("groq", "vision", "llama-3.2-90b-vision-preview"),
    ("groq", "default", "llama-3.1-8b-instant"),
    ("deepseek", "fast", "deepseek-chat"),
    ("deepseek", "smart", "deepseek-reasoner"),
    ("deepseek", "code", "deepseek-chat"),
    ("deepseek", "vision", "deepseek-chat"),
    ("deepseek", "default", "deepseek-chat"),
    ("together", "fast", "meta-llama/Llama-3.2-3B-Instruct-Turbo"),
    ("together", "smart", "meta-llama/Llama-3.3-70B-Instruct-Turbo"),
    ("together", "code", "Qwen/Qwen2.5-Coder-32B-Instruct"),
    ("together", "vision", "meta-llama/Llama-3.2-11B-Vision-Instruct-Turbo"),
    ("together", "default", "meta-llama/Llama-3.2-3B-Instruct-Turbo"),
    ("xai", "fast", "grok-3-mini"),
    ("xai", "smart", "grok-3"),
    ("xai", "code", "grok-3"),
    ("xai", "vision", "grok-2-vision-1212"),
    ("xai", "default", "grok-3-mini"),
    ("qwen", "fast", "qwen-turbo"),
    ("qwen", "smart", "qwen-max"),
    ("qwen", "code", "qwen-coder-plus"),
    ("qwen", "vision", "qwen-vl-plus"),
    ("qwen", "default", "qwen-plus"),
    ("ollama", "fast", "llama3.2"),
    ("ollama", "smart", "llama3.1:70b"),
    ("ollama", "code", "qwen2.5-coder"),
    ("ollama", "vision", "llama3.2-vision"),
    ("ollama", "default", "llama3.2"),
];

const KNOWN_ALIASES: &[&str] = &["fast", "smart", "code", "vision", "default"];

/// Resolves `model` for `provider_alias`.
///
/// - A concrete model name (not one of the known aliases) passes through.
/// - `CONDUCTOR_<PROVIDER>_MODEL_<ALIAS>` overrides the table when set.
/// - An empty `provider_alias` resolves as `openai`.
/// - An unknown provider alias leaves the alias unresolved (pass-through).
pub fn resolve_model(provider_alias: &str, model: &str) -> String {
    if !KNOWN_ALIASES.contains(&model) {
        return model.to_string();
    }
    let provider = if provider_alias.is_empty() {
        "openai"
    } else {
        provider_alias
    };

    let override_var = format!(
        "CONDUCTOR_{}_MODEL_{}",
        provider.to_uppercase().replace(['-', '.'], "_"),
        model.to_uppercase()
    );
    if let Ok(value) = std::env::var(&override_var) {
        if !value.is_empty() {
            return value;
        }
    }

    MODEL_ALIASES
        .iter()
        .find(|(p, a, _)| *p == provider && *a == model)
        .map(|(_, _, m)| (*m).to_string())
        .unwrap_or_else(|| model.to_string())
}
