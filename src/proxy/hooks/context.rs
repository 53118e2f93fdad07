use std::sync::Arc;
use tokio::sync::RwLock;

/// Context for an incoming chat-completion request
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request identifier
    pub request_id: String,
    /// Session ID from the x-session-id header
    pub session_id: Option<String>,
    /// Model being used
    pub model: String,
    /// Request path on the proxy
    pub path: String,
    /// Whether the client asked for a streamed response
    pub stream: bool,
    /// Forwarded request body (JSON)
    pub body: serde_json::Value,
    /// Request timestamp (Unix epoch seconds)
    pub timestamp: i64,
    /// ISO8601 formatted timestamp
    pub timestamp_iso: String,
}

impl RequestContext {
    pub fn new(
        session_id: Option<String>,
        model: String,
        path: String,
        stream: bool,
        body: serde_json::Value,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            session_id,
            model,
            path,
            stream,
            body,
            timestamp: now.timestamp(),
            timestamp_iso: now.to_rfc3339(),
        }
    }
}

/// Context for a completed upstream response
#[derive(Debug, Clone, Default)]
pub struct ResponseContext {
    pub status_code: u16,
    pub duration_ms: u64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub is_success: bool,
    pub error_message: Option<String>,
    /// Response timestamp (Unix epoch seconds)
    pub timestamp: i64,
}

impl ResponseContext {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            is_success: (200..300).contains(&status_code),
            timestamp: chrono::Utc::now().timestamp(),
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_tokens(mut self, prompt: i64, completion: i64) -> Self {
        self.prompt_tokens = prompt;
        self.completion_tokens = completion;
        self
    }

    pub fn with_error(mut self, msg: String) -> Self {
        self.error_message = Some(msg);
        self.is_success = false;
        self
    }
}

/// Accumulates response data while a streamed body is relayed
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    inner: Arc<RwLock<ResponseBuilderInner>>,
}

#[derive(Debug, Default)]
struct ResponseBuilderInner {
    status_code: u16,
    start_time: Option<std::time::Instant>,
    prompt_tokens: i64,
    completion_tokens: i64,
    error_message: Option<String>,
}

impl ResponseBuilder {
    pub fn new(status_code: u16, start_time: std::time::Instant) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ResponseBuilderInner {
                status_code,
                start_time: Some(start_time),
                ..Default::default()
            })),
        }
    }

    pub async fn set_tokens(&self, prompt: i64, completion: i64) {
        let mut inner = self.inner.write().await;
        inner.prompt_tokens = prompt;
        inner.completion_tokens = completion;
    }

    pub async fn set_error(&self, msg: String) {
        let mut inner = self.inner.write().await;
        inner.error_message = Some(msg);
    }

    pub async fn build(&self) -> ResponseContext {
        let inner = self.inner.read().await;
        let duration_ms = inner
            .start_time
            .map(|s| s.elapsed().as_millis() as u64)
            .unwrap_or(0);

        ResponseContext {
            status_code: inner.status_code,
            duration_ms,
            prompt_tokens: inner.prompt_tokens,
            completion_tokens: inner.completion_tokens,
            is_success: (200..300).contains(&inner.status_code) && inner.error_message.is_none(),
            error_message: inner.error_message.clone(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_context_success_range() {
        assert!(ResponseContext::new(200).is_success);
        assert!(!ResponseContext::new(429).is_success);
        assert!(!ResponseContext::new(200).with_error("boom".into()).is_success);
    }

    #[tokio::test]
    async fn test_builder_error_marks_failure() {
        let builder = ResponseBuilder::new(200, std::time::Instant::now());
        builder.set_tokens(10, 5).await;
        assert!(builder.build().await.is_success);

        builder.set_error("stream aborted".into()).await;
        let res = builder.build().await;
        assert!(!res.is_success);
        assert_eq!(res.prompt_tokens, 10);
        assert_eq!(res.completion_tokens, 5);
    }
}
