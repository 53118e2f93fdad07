use async_trait::async_trait;
use super::context::{RequestContext, ResponseContext};

/// Hook trait for observing proxied chat-completion requests (read-only)
#[async_trait]
pub trait Hook: Send + Sync {
    /// Called before the request is sent upstream
    async fn on_request_before(&self, ctx: &RequestContext);

    /// Called once the response is complete (streamed or not), or the request failed
    async fn on_response_complete(&self, req_ctx: &RequestContext, res_ctx: &ResponseContext);

    /// Return the hook name for logging purposes
    fn name(&self) -> &'static str;
}
