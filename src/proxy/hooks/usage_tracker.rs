use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use super::context::{RequestContext, ResponseContext};
use super::traits::Hook;

/// Usage counters for a single session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUsage {
    pub request_count: u64,
    pub failed_count: u64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub last_status: Option<u16>,
}

/// Records per-session request counts and token usage
#[derive(Debug, Clone, Default)]
pub struct UsageTrackerHook {
    usage: Arc<RwLock<HashMap<String, SessionUsage>>>,
}

const ANONYMOUS: &str = "anonymous";

impl UsageTrackerHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn usage(&self, session_id: &str) -> Option<SessionUsage> {
        self.usage.read().await.get(session_id).cloned()
    }

    pub async fn forget(&self, session_id: &str) {
        self.usage.write().await.remove(session_id);
    }
}

#[async_trait]
impl Hook for UsageTrackerHook {
    async fn on_request_before(&self, ctx: &RequestContext) {
        let key = ctx.session_id.as_deref().unwrap_or(ANONYMOUS);
        let mut usage = self.usage.write().await;
        usage.entry(key.to_string()).or_default().request_count += 1;
    }

    async fn on_response_complete(&self, req_ctx: &RequestContext, res_ctx: &ResponseContext) {
        let key = req_ctx.session_id.as_deref().unwrap_or(ANONYMOUS);
        let mut usage = self.usage.write().await;
        let entry = usage.entry(key.to_string()).or_default();
        entry.prompt_tokens += res_ctx.prompt_tokens;
        entry.completion_tokens += res_ctx.completion_tokens;
        entry.last_status = Some(res_ctx.status_code);
        if !res_ctx.is_success {
            entry.failed_count += 1;
        }

        tracing::info!(
            "USAGE: session={} model={} status={} prompt={} completion={} duration={}ms",
            key,
            req_ctx.model,
            res_ctx.status_code,
            res_ctx.prompt_tokens,
            res_ctx.completion_tokens,
            res_ctx.duration_ms
        );
    }

    fn name(&self) -> &'static str {
        "UsageTracker"
    }
}
