use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::AssistantError;
use crate::models::ChatMessage;
use crate::proxy::server::{CHAT_PATH, SESSION_HEADER};

/// Remote chat-completion model
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AssistantError>;
}

/// Talks to the AI proxy's chat-completion route under one session
#[derive(Debug, Clone)]
pub struct ProxyChatClient {
    client: reqwest::Client,
    endpoint: String,
    session_id: String,
    model: Option<String>,
    temperature: f32,
}

impl ProxyChatClient {
    /// `proxy_url` is the proxy origin, e.g. `http://127.0.0.1:3000`
    pub fn new(proxy_url: &str, session_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}{}", proxy_url.trim_end_matches('/'), CHAT_PATH),
            session_id: session_id.into(),
            model: None,
            temperature: 0.7,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// `choices[0].message.content` of a completion body
pub fn extract_content(body: &Value) -> Result<String, AssistantError> {
    body.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AssistantError::MalformedResponse("missing choices[0].message.content".to_string()))
}

#[async_trait]
impl ChatClient for ProxyChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AssistantError> {
        let mut body = json!({
            "messages": messages,
            "temperature": self.temperature,
            "stream": false,
        });
        if let Some(model) = &self.model {
            body["model"] = Value::String(model.clone());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header(SESSION_HEADER, &self.session_id)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(AssistantError::Chat(format!("status {}: {}", status.as_u16(), text)));
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| AssistantError::MalformedResponse(e.to_string()))?;
        extract_content(&json)
    }
}
