use crate::error::ProxyError;
use crate::models::{ConfigureRequest, PublicSessionConfig, SessionConfig, SessionSummary};
use crate::storage::{session_store::short_id, SessionStore};
use super::hooks::{HookRegistry, RequestContext, ResponseBuilder, ResponseContext, UsageTrackerHook};
use anyhow::Result;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub const SESSION_HEADER: &str = "x-session-id";
pub const CHAT_PATH: &str = "/api/ai/chat/completions";

/// Session key used when a chat request carries no session header
const ANONYMOUS_SESSION: &str = "anonymous";

// Model and streaming flag of the forwarded body
#[derive(Debug, Clone, Default, PartialEq)]
struct RequestInfo {
    model: String,
    stream: bool,
}

// Token usage reported by the upstream
#[derive(Debug, Clone, Default, PartialEq)]
struct UsageInfo {
    prompt_tokens: i64,
    completion_tokens: i64,
}

fn parse_request_info(body: &Value) -> RequestInfo {
    RequestInfo {
        model: body.get("model").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
        stream: body.get("stream").and_then(|v| v.as_bool()).unwrap_or(false),
    }
}

fn parse_usage_from_json(json: &Value) -> Option<UsageInfo> {
    // Streamed chunks carry "usage": null until the final one
    let usage = json.get("usage").filter(|u| u.is_object())?;
    Some(UsageInfo {
        prompt_tokens: usage.get("prompt_tokens").and_then(|v| v.as_i64()).unwrap_or(0),
        completion_tokens: usage.get("completion_tokens").and_then(|v| v.as_i64()).unwrap_or(0),
    })
}

fn parse_usage_from_sse(data: &str) -> Option<UsageInfo> {
    data.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|payload| *payload != "[DONE]")
        .filter_map(|payload| serde_json::from_str::<Value>(payload).ok())
        .find_map(|json| parse_usage_from_json(&json))
}

/// Shared state behind every route
#[derive(Clone)]
pub struct ProxyState {
    pub sessions: SessionStore,
    pub client: reqwest::Client,
    pub hooks: HookRegistry,
    pub usage: UsageTrackerHook,
}

impl ProxyState {
    /// State with the usage tracker registered as a hook
    pub async fn new(sessions: SessionStore) -> Self {
        let hooks = HookRegistry::new();
        let usage = UsageTrackerHook::new();
        hooks.register(Arc::new(usage.clone())).await;

        Self {
            sessions,
            client: reqwest::Client::new(),
            hooks,
            usage,
        }
    }
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/ai/health", get(ai_health))
        .route("/api/ai/default-config", get(default_config))
        .route("/api/ai/configure", post(configure))
        .route("/api/ai/config/:session_id", get(get_config).delete(delete_config))
        .route("/api/ai/sessions", get(list_sessions))
        .route(CHAT_PATH, post(chat_completions))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct ProxyServer {
    state: ProxyState,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl ProxyServer {
    pub fn new(state: ProxyState) -> Self {
        Self {
            state,
            shutdown_tx: None,
        }
    }

    /// Bind and serve in the background; returns the bound address
    pub async fn start(&mut self, addr: SocketAddr) -> Result<SocketAddr> {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        self.shutdown_tx = Some(tx);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Proxy server starting on {}", local_addr);

        let app = router(self.state.clone());
        tokio::spawn(async move {
            let server = axum::serve(listener, app.into_make_service()).with_graceful_shutdown(async {
                let _ = rx.await;
                tracing::info!("Proxy server shutting down");
            });
            if let Err(e) = server.await {
                tracing::error!("Proxy server error: {}", e);
            }
        });

        Ok(local_addr)
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn ai_health(State(state): State<ProxyState>) -> Json<Value> {
    let defaults = state.sessions.defaults();
    Json(json!({
        "status": "ok",
        "provider": defaults.provider,
        "model": defaults.model,
        "activeSessions": state.sessions.len().await,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn default_config(State(state): State<ProxyState>) -> Json<Value> {
    let defaults = state.sessions.defaults();
    Json(json!({
        "provider": defaults.provider,
        "baseUrl": defaults.base_url,
        "model": defaults.model,
        "hasApiKey": !defaults.api_key.is_empty(),
    }))
}

async fn configure(
    State(state): State<ProxyState>,
    body: Bytes,
) -> Result<Json<Value>, ProxyError> {
    let req: ConfigureRequest =
        serde_json::from_slice(&body).map_err(|e| ProxyError::InvalidBody(e.to_string()))?;

    let session_id = req
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ProxyError::MissingSessionId)?
        .to_string();

    let config = SessionConfig::resolve(&session_id, &req, state.sessions.defaults());
    let public = config.to_public();
    state.sessions.put(config).await;

    Ok(Json(json!({
        "success": true,
        "sessionId": session_id,
        "config": public,
    })))
}

async fn get_config(
    State(state): State<ProxyState>,
    Path(session_id): Path<String>,
) -> Result<Json<PublicSessionConfig>, ProxyError> {
    state
        .sessions
        .get(&session_id)
        .await
        .map(|c| Json(c.to_public()))
        .ok_or(ProxyError::SessionNotFound(session_id))
}

async fn delete_config(
    State(state): State<ProxyState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ProxyError> {
    state
        .sessions
        .remove(&session_id)
        .await
        .ok_or_else(|| ProxyError::SessionNotFound(session_id.clone()))?;
    state.usage.forget(&session_id).await;

    tracing::info!("Session removed: {}", short_id(&session_id));
    Ok(Json(json!({ "success": true, "sessionId": session_id })))
}

async fn list_sessions(State(state): State<ProxyState>) -> Json<Vec<SessionSummary>> {
    let mut summaries = Vec::new();
    for config in state.sessions.list().await {
        let usage = state.usage.usage(&config.session_id).await.unwrap_or_default();
        summaries.push(SessionSummary {
            session_id: config.session_id,
            provider: config.provider,
            model: config.model,
            is_custom: config.is_custom,
            configured_at: config.timestamp,
            request_count: usage.request_count,
            total_prompt_tokens: usage.prompt_tokens,
            total_completion_tokens: usage.completion_tokens,
        });
    }
    Json(summaries)
}

async fn chat_completions(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    // Unconfigured sessions get the defaults stored for them
    let config = match &session_id {
        Some(id) => state.sessions.get_or_default(id).await,
        None => SessionConfig::from_defaults(ANONYMOUS_SESSION, state.sessions.defaults()),
    };

    let mut payload: Value =
        serde_json::from_slice(&body).map_err(|e| ProxyError::InvalidBody(e.to_string()))?;
    let fields = payload
        .as_object_mut()
        .ok_or_else(|| ProxyError::InvalidBody("expected a JSON object".to_string()))?;
    if !fields.get("model").map(Value::is_string).unwrap_or(false) {
        fields.insert("model".to_string(), Value::String(config.model.clone()));
    }

    let request_info = parse_request_info(&payload);
    let target_url = config.completions_url();

    tracing::info!(
        "PROXY: POST {} | Model: {} | Session: {} | Stream: {} | BodySize: {}",
        target_url,
        request_info.model,
        session_id.as_deref().map(short_id).unwrap_or("none"),
        request_info.stream,
        body.len()
    );

    let req_ctx = RequestContext::new(
        session_id,
        request_info.model.clone(),
        CHAT_PATH.to_string(),
        request_info.stream,
        payload,
    );
    state.hooks.trigger_request_before(&req_ctx).await;

    let started = Instant::now();
    let mut request_builder = state.client.post(&target_url).json(&req_ctx.body);
    if !config.api_key.is_empty() {
        request_builder = request_builder.bearer_auth(&config.api_key);
    }

    let response = match request_builder.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Proxy request failed: {}", e);
            let res_ctx = ResponseContext::new(StatusCode::INTERNAL_SERVER_ERROR.as_u16())
                .with_duration(started.elapsed().as_millis() as u64)
                .with_error(e.to_string());
            state.hooks.trigger_response_complete(&req_ctx, &res_ctx).await;
            return Err(ProxyError::Network(e));
        }
    };

    let status = response.status().as_u16();
    tracing::info!("PROXY RESPONSE: {}", status);

    if request_info.stream && response.status().is_success() {
        return Ok(stream_response(&state, req_ctx, response, started));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();
    let bytes = response.bytes().await?;

    let usage = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .and_then(|json| parse_usage_from_json(&json))
        .unwrap_or_default();
    let mut res_ctx = ResponseContext::new(status)
        .with_duration(started.elapsed().as_millis() as u64)
        .with_tokens(usage.prompt_tokens, usage.completion_tokens);

    if !res_ctx.is_success {
        let text = String::from_utf8_lossy(&bytes).to_string();
        res_ctx = res_ctx.with_error(text.clone());
        state.hooks.trigger_response_complete(&req_ctx, &res_ctx).await;
        return Err(ProxyError::Upstream { status, body: text });
    }

    state.hooks.trigger_response_complete(&req_ctx, &res_ctx).await;

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    Ok((status, [(header::CONTENT_TYPE, content_type)], Body::from(bytes)).into_response())
}

/// Fires the completion hooks exactly once for a streamed response.
///
/// Normally `complete` runs as the last item of the relayed stream. If the
/// body is dropped first (client disconnect), `Drop` records the request as
/// failed with whatever usage was seen so far.
struct CompletionGuard {
    hooks: HookRegistry,
    builder: ResponseBuilder,
    req_ctx: Option<RequestContext>,
}

impl CompletionGuard {
    async fn complete(mut self) {
        if let Some(req_ctx) = self.req_ctx.take() {
            let res_ctx = self.builder.build().await;
            self.hooks.trigger_response_complete(&req_ctx, &res_ctx).await;
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let Some(req_ctx) = self.req_ctx.take() else {
            return;
        };
        tracing::warn!("PROXY: stream closed before completion | Request: {}", req_ctx.request_id);

        let hooks = self.hooks.clone();
        let builder = self.builder.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    builder.set_error("stream closed before completion".to_string()).await;
                    let res_ctx = builder.build().await;
                    hooks.trigger_response_complete(&req_ctx, &res_ctx).await;
                });
            }
            Err(_) => tracing::error!("No runtime to record usage for {}", req_ctx.request_id),
        }
    }
}

/// Relay an upstream SSE body chunk by chunk, firing completion hooks at the end
fn stream_response(
    state: &ProxyState,
    req_ctx: RequestContext,
    response: reqwest::Response,
    started: Instant,
) -> Response {
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::OK);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/event-stream")
        .to_string();

    let builder = ResponseBuilder::new(status.as_u16(), started);
    let chunk_builder = builder.clone();

    let chunks = response.bytes_stream().then(move |chunk| {
        let builder = chunk_builder.clone();
        async move {
            match &chunk {
                Ok(bytes) => {
                    if let Some(usage) = std::str::from_utf8(bytes).ok().and_then(parse_usage_from_sse) {
                        builder.set_tokens(usage.prompt_tokens, usage.completion_tokens).await;
                    }
                }
                Err(e) => {
                    tracing::error!("Upstream stream error: {}", e);
                    builder.set_error(e.to_string()).await;
                }
            }
            chunk
        }
    });

    let guard = CompletionGuard {
        hooks: state.hooks.clone(),
        builder,
        req_ctx: Some(req_ctx),
    };
    let tail = futures::stream::once(guard.complete())
        .filter_map(|_| async { None::<Result<Bytes, reqwest::Error>> });

    let body = Body::from_stream(chunks.chain(tail));

    (
        status,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}
