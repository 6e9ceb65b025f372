//! Engine registry — maps answer-engine names to endpoint configurations.
//!
//! Every engine the product tracks speaks an OpenAI-compatible chat API;
//! entries differ only in endpoint, auth style, and API-key env vars.

/// How to attach auth credentials to requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// No authentication required (local servers, proxies).
    None,
}

/// Configuration for a single answer engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine identifier.
    pub name: &'static str,
    /// Base URL for the API.
    pub base_url: &'static str,
    /// Path for chat completions (appended to base_url).
    pub chat_path: &'static str,
    /// Environment variable names to try for the API key (in order).
    pub env_keys: &'static [&'static str],
    /// How to send auth credentials.
    pub auth_style: AuthStyle,
    /// Environment variable to override the base URL.
    pub base_url_env: Option<&'static str>,
    /// Model queried when the catalog row carries none.
    pub default_model: &'static str,
}

/// All known answer engines.
static ENGINES: &[EngineConfig] = &[
    EngineConfig {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        chat_path: "/chat/completions",
        env_keys: &["OPENAI_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: Some("OPENAI_API_BASE"),
        default_model: "gpt-4o-mini",
    },
    EngineConfig {
        name: "anthropic",
        base_url: "https://api.anthropic.com/v1",
        chat_path: "/chat/completions",
        env_keys: &["ANTHROPIC_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
        default_model: "claude-3-5-haiku-20241022",
    },
    EngineConfig {
        name: "perplexity",
        base_url: "https://api.perplexity.ai",
        chat_path: "/chat/completions",
        env_keys: &["PERPLEXITY_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
        default_model: "sonar",
    },
    EngineConfig {
        name: "gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        chat_path: "/chat/completions",
        env_keys: &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
        default_model: "gemini-2.5-flash",
    },
    EngineConfig {
        name: "deepseek",
        base_url: "https://api.deepseek.com",
        chat_path: "/chat/completions",
        env_keys: &["DEEPSEEK_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
        default_model: "deepseek-chat",
    },
    EngineConfig {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        chat_path: "/chat/completions",
        env_keys: &["OPENROUTER_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
        default_model: "openai/gpt-4o-mini",
    },
];

/// Look up an engine config by name.
pub fn get_engine_config(name: &str) -> Option<&'static EngineConfig> {
    let lookup = match name {
        "google" => "gemini",
        "pplx" => "perplexity",
        other => other,
    };
    ENGINES.iter().find(|e| e.name == lookup)
}

/// List all known engine names.
pub fn all_engine_names() -> Vec<&'static str> {
    ENGINES.iter().map(|e| e.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_aliases() {
        assert_eq!(get_engine_config("openai").unwrap().name, "openai");
        assert_eq!(get_engine_config("google").unwrap().name, "gemini");
        assert_eq!(get_engine_config("pplx").unwrap().name, "perplexity");
        assert!(get_engine_config("does-not-exist").is_none());
    }

    #[test]
    fn test_all_names_nonempty() {
        let names = all_engine_names();
        assert!(names.contains(&"perplexity"));
        assert!(names.len() >= 5);
    }
}
