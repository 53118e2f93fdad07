use serde::{Deserialize, Serialize};

use crate::config::{provider_preset, AiDefaults};

/// Per-session upstream configuration (in-memory only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub session_id: String,
    pub provider: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub is_custom: bool,
    pub timestamp: i64,
}

/// Body of `POST /api/ai/configure`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRequest {
    pub session_id: Option<String>,
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Session config as returned to callers; never carries the key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSessionConfig {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub is_custom: bool,
    pub has_api_key: bool,
}

/// Session listing entry with usage counters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub provider: String,
    pub model: String,
    pub is_custom: bool,
    pub configured_at: i64,
    pub request_count: u64,
    pub total_prompt_tokens: i64,
    pub total_completion_tokens: i64,
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl SessionConfig {
    /// Session config populated entirely from the defaults
    pub fn from_defaults(session_id: &str, defaults: &AiDefaults) -> Self {
        Self {
            session_id: session_id.to_string(),
            provider: defaults.provider.clone(),
            api_key: defaults.api_key.clone(),
            base_url: defaults.base_url.clone(),
            model: defaults.model.clone(),
            is_custom: false,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Resolve a configure request against the defaults.
    ///
    /// An explicit base URL marks the config as custom; otherwise the
    /// provider preset is used, falling back to the default base URL for
    /// unknown providers.
    pub fn resolve(session_id: &str, req: &ConfigureRequest, defaults: &AiDefaults) -> Self {
        let provider = non_empty(&req.provider)
            .map(|p| p.to_lowercase())
            .unwrap_or_else(|| defaults.provider.clone());
        let preset = provider_preset(&provider);

        let (base_url, is_custom) = match non_empty(&req.base_url) {
            Some(url) => (url.trim_end_matches('/').to_string(), true),
            None => (
                preset
                    .map(|p| p.base_url.to_string())
                    .unwrap_or_else(|| defaults.base_url.clone()),
                false,
            ),
        };

        let model = non_empty(&req.model)
            .map(str::to_string)
            .or_else(|| preset.map(|p| p.model.to_string()))
            .unwrap_or_else(|| defaults.model.clone());

        let api_key = non_empty(&req.api_key)
            .map(str::to_string)
            .unwrap_or_else(|| defaults.api_key.clone());

        Self {
            session_id: session_id.to_string(),
            provider,
            api_key,
            base_url,
            model,
            is_custom,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub fn to_public(&self) -> PublicSessionConfig {
        PublicSessionConfig {
            provider: self.provider.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            is_custom: self.is_custom,
            has_api_key: !self.api_key.is_empty(),
        }
    }
}
