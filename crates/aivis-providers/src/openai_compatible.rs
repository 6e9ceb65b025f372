//! Unified OpenAI-compatible answer-engine client.
//!
//! A single struct handles the ask-one-prompt call for ALL OpenAI-compatible
//! answer APIs. Engines are distinguished only by endpoint URL, auth style,
//! and API key.

use aivis_core::error::{AivisError, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::registry::{AuthStyle, EngineConfig};
use crate::AnswerEngine;

/// A unified client that works with any OpenAI-compatible answer API.
#[derive(Debug)]
pub struct OpenAiCompatibleEngine {
    /// Engine name (e.g., "openai", "perplexity").
    name: String,
    /// API key for authentication.
    api_key: String,
    /// Base URL for the API.
    base_url: String,
    /// Path for chat completions.
    chat_path: String,
    /// Model queried when the caller passes an empty model.
    default_model: String,
    /// Authentication style.
    auth_style: AuthStyle,
    /// HTTP client.
    client: reqwest::Client,
}

impl OpenAiCompatibleEngine {
    /// Create from a registry entry.
    ///
    /// Resolution order:
    /// - API key: env vars (registry order) > `fallback_api_key` > empty
    /// - Base URL: `endpoint_override` > env override > registry default
    pub fn from_registry(
        registry: &EngineConfig,
        fallback_api_key: &str,
        endpoint_override: &str,
    ) -> Self {
        let api_key = registry
            .env_keys
            .iter()
            .find_map(|key| std::env::var(key).ok())
            .unwrap_or_else(|| fallback_api_key.to_string());

        let base_url = if !endpoint_override.is_empty() {
            endpoint_override.trim_end_matches('/').to_string()
        } else {
            registry
                .base_url_env
                .and_then(|env_key| std::env::var(env_key).ok())
                .unwrap_or_else(|| registry.base_url.to_string())
        };

        Self {
            name: registry.name.to_string(),
            api_key,
            base_url,
            chat_path: registry.chat_path.to_string(),
            default_model: registry.default_model.to_string(),
            auth_style: registry.auth_style,
            client: reqwest::Client::new(),
        }
    }

    /// Build the auth header for the request.
    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_style {
            AuthStyle::Bearer if !self.api_key.is_empty() => {
                req.header("Authorization", format!("Bearer {}", self.api_key))
            }
            _ => req,
        }
    }
}

#[async_trait]
impl AnswerEngine for OpenAiCompatibleEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ask(&self, prompt: &str, model: &str) -> Result<String> {
        if self.auth_style != AuthStyle::None && self.api_key.is_empty() {
            return Err(AivisError::ApiKeyMissing(self.name.clone()));
        }

        let model = if model.is_empty() {
            self.default_model.as_str()
        } else {
            model
        };

        let url = format!("{}{}", self.base_url, self.chat_path);
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .apply_auth(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AivisError::Http(format!("{} request failed: {e}", self.name)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AivisError::Engine(format!(
                "{} returned {status}: {text}",
                self.name
            )));
        }

        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AivisError::Engine(format!("{} bad response body: {e}", self.name)))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                AivisError::Engine(format!("{} response missing message content", self.name))
            })
    }
}
