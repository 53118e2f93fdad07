use std::sync::Arc;
use tokio::sync::RwLock;
use super::context::{RequestContext, ResponseContext};
use super::traits::Hook;

/// Registry for managing hooks
#[derive(Clone)]
pub struct HookRegistry {
    hooks: Arc<RwLock<Vec<Arc<dyn Hook>>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            hooks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn register(&self, hook: Arc<dyn Hook>) {
        let mut hooks = self.hooks.write().await;
        tracing::info!("Registering hook: {}", hook.name());
        hooks.push(hook);
    }

    /// Hooks run in registration order
    pub async fn trigger_request_before(&self, ctx: &RequestContext) {
        let hooks = self.hooks.read().await;
        for hook in hooks.iter() {
            hook.on_request_before(ctx).await;
        }
    }

    pub async fn trigger_response_complete(&self, req_ctx: &RequestContext, res_ctx: &ResponseContext) {
        let hooks = self.hooks.read().await;
        for hook in hooks.iter() {
            hook.on_response_complete(req_ctx, res_ctx).await;
        }
    }

    pub async fn hook_count(&self) -> usize {
        self.hooks.read().await.len()
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
