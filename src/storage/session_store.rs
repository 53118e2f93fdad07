use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::AiDefaults;
use crate::models::SessionConfig;

/// In-memory session configuration map.
///
/// Entries live until removed or the process exits.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionConfig>>>,
    defaults: Arc<AiDefaults>,
}

impl SessionStore {
    pub fn new(defaults: AiDefaults) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            defaults: Arc::new(defaults),
        }
    }

    pub fn defaults(&self) -> &AiDefaults {
        &self.defaults
    }

    pub async fn put(&self, config: SessionConfig) {
        let mut sessions = self.sessions.write().await;
        tracing::info!(
            "Session configured: {} provider={} custom={}",
            short_id(&config.session_id),
            config.provider,
            config.is_custom
        );
        sessions.insert(config.session_id.clone(), config);
    }

    pub async fn get(&self, session_id: &str) -> Option<SessionConfig> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Stored config, or the default config which is then stored for the session
    pub async fn get_or_default(&self, session_id: &str) -> SessionConfig {
        if let Some(config) = self.get(session_id).await {
            return config;
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::info!("Auto-configuring session {} with defaults", short_id(session_id));
                SessionConfig::from_defaults(session_id, &self.defaults)
            })
            .clone()
    }

    pub async fn remove(&self, session_id: &str) -> Option<SessionConfig> {
        self.sessions.write().await.remove(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// All configs, oldest first
    pub async fn list(&self) -> Vec<SessionConfig> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<SessionConfig> = sessions.values().cloned().collect();
        list.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.session_id.cmp(&b.session_id)));
        list
    }
}

/// First 12 chars of a session id, for log lines
pub fn short_id(session_id: &str) -> &str {
    match session_id.char_indices().nth(12) {
        Some((idx, _)) => &session_id[..idx],
        None => session_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConfigureRequest;

    #[tokio::test]
    async fn test_get_or_default_populates_store() {
        let store = SessionStore::new(AiDefaults::default());
        assert!(store.get("abc").await.is_none());

        let config = store.get_or_default("abc").await;
        assert_eq!(config.base_url, AiDefaults::default().base_url);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("abc").await, Some(config));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = SessionStore::new(AiDefaults::default());
        let first = SessionConfig::from_defaults("s", store.defaults());
        store.put(first).await;

        let req = ConfigureRequest {
            provider: Some("groq".to_string()),
            ..Default::default()
        };
        store.put(SessionConfig::resolve("s", &req, store.defaults())).await;

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("s").await.map(|c| c.provider), Some("groq".to_string()));
    }

    #[tokio::test]
    async fn test_remove() {
        let store = SessionStore::new(AiDefaults::default());
        store.get_or_default("gone").await;
        assert!(store.remove("gone").await.is_some());
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }
}
