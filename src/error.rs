use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors surfaced by the HTTP proxy routes
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Session ID is required")]
    MissingSessionId,

    #[error("No configuration found for session {0}")]
    SessionNotFound(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Upstream answered with a non-2xx status; the body is relayed as the message
    #[error("AI API request failed with status {status}")]
    Upstream { status: u16, body: String },

    #[error("Failed to connect to AI service")]
    Network(#[from] reqwest::Error),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingSessionId | ProxyError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ProxyError::Network(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ProxyError::Upstream { body, .. } => {
                // Upstream JSON errors are relayed as structured values
                let message = serde_json::from_str::<serde_json::Value>(body)
                    .unwrap_or_else(|_| serde_json::Value::String(body.clone()));
                json!({ "error": self.to_string(), "message": message })
            }
            ProxyError::Network(e) => json!({ "error": self.to_string(), "message": e.to_string() }),
            _ => json!({ "error": self.to_string() }),
        };

        tracing::warn!("Request failed: {} ({})", self, status.as_u16());
        (status, Json(body)).into_response()
    }
}

/// Errors raised while mutating meeting state
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeetingError {
    #[error("Agenda point not found: {0}")]
    AgendaPointNotFound(String),

    #[error("Action item not found: {0}")]
    ActionItemNotFound(String),

    #[error("Title must not be empty")]
    EmptyTitle,
}

/// Errors raised by the assistant pipeline
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Missing parameter '{param}' for {function}")]
    MissingParameter { function: String, param: String },

    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter { param: String, reason: String },

    #[error(transparent)]
    Meeting(#[from] MeetingError),

    #[error("Chat request failed: {0}")]
    Chat(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for AssistantError {
    fn from(e: reqwest::Error) -> Self {
        AssistantError::Chat(e.to_string())
    }
}
