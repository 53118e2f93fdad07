use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_PROVIDER: &str = "openai";

/// Known upstream providers: (name, base URL, default model)
const PROVIDER_PRESETS: &[(&str, &str, &str)] = &[
    ("openai", "https://api.openai.com/v1", "gpt-4o-mini"),
    ("openrouter", "https://openrouter.ai/api/v1", "openai/gpt-4o-mini"),
    ("groq", "https://api.groq.com/openai/v1", "llama-3.1-8b-instant"),
    ("deepseek", "https://api.deepseek.com/v1", "deepseek-chat"),
    ("together", "https://api.together.xyz/v1", "meta-llama/Llama-3-8b-chat-hf"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderPreset {
    pub name: &'static str,
    pub base_url: &'static str,
    pub model: &'static str,
}

/// Look up a provider preset by case-insensitive name
pub fn provider_preset(name: &str) -> Option<ProviderPreset> {
    let name = name.trim().to_lowercase();
    PROVIDER_PRESETS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|&(name, base_url, model)| ProviderPreset { name, base_url, model })
}

/// Default upstream used when a session has not configured its own
#[derive(Debug, Clone, PartialEq)]
pub struct AiDefaults {
    pub provider: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl Default for AiDefaults {
    fn default() -> Self {
        // PROVIDER_PRESETS[0] is DEFAULT_PROVIDER
        let (name, base_url, model) = PROVIDER_PRESETS[0];
        Self {
            provider: name.to_string(),
            base_url: base_url.to_string(),
            api_key: String::new(),
            model: model.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub ai: AiDefaults,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ai: AiDefaults::default(),
        }
    }
}

/// On-disk layout of config.toml; every field optional
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    #[serde(default)]
    ai: FileAiConfig,
}

#[derive(Debug, Default, Deserialize)]
struct FileAiConfig {
    provider: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
}

impl AppConfig {
    /// Defaults, then config file (if any), then environment variables
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        let path = Self::config_path();
        if let Some(path) = path.filter(|p| p.exists()) {
            config.apply_file(&path)?;
            tracing::info!("Loaded config file: {:?}", path);
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// `MEENOE_CONFIG` wins over `<config_dir>/meenoe/config.toml`
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("MEENOE_CONFIG") {
            return Some(PathBuf::from(p));
        }
        dirs::config_dir().map(|d| d.join("meenoe").join("config.toml"))
    }

    /// Resolve `host:port`; `host` may be an IP literal or a name such as `localhost`
    pub async fn bind_addr(&self) -> Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))?;
        addrs
            .next()
            .with_context(|| format!("No address found for {}", self.host))
    }

    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        self.apply_toml(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))
    }

    fn apply_toml(&mut self, content: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(content)?;
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        self.apply_ai(file.ai.provider, file.ai.base_url, file.ai.api_key, file.ai.model);
        Ok(())
    }

    /// Applies `HOST`, `PORT`, `AI_PROVIDER`, `AI_BASE_URL`, `AI_API_KEY`, `AI_MODEL`
    pub fn apply_env<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = get("HOST").filter(|h| !h.trim().is_empty()) {
            self.host = host.trim().to_string();
        }
        if let Some(port) = get("PORT").filter(|p| !p.trim().is_empty()) {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }
        self.apply_ai(get("AI_PROVIDER"), get("AI_BASE_URL"), get("AI_API_KEY"), get("AI_MODEL"));
        Ok(())
    }

    fn apply_ai(
        &mut self,
        provider: Option<String>,
        base_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
    ) {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        if let Some(provider) = non_empty(provider) {
            // A provider switch carries its preset unless overridden below
            if let Some(preset) = provider_preset(&provider) {
                self.ai.base_url = preset.base_url.to_string();
                self.ai.model = preset.model.to_string();
            }
            self.ai.provider = provider.trim().to_lowercase();
        }
        if let Some(base_url) = non_empty(base_url) {
            self.ai.base_url = base_url.trim().trim_end_matches('/').to_string();
        }
        if let Some(api_key) = non_empty(api_key) {
            self.ai.api_key = api_key.trim().to_string();
        }
        if let Some(model) = non_empty(model) {
            self.ai.model = model.trim().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_have_no_api_key() {
        let config = AppConfig::default();
        assert_eq!(config.ai.provider, DEFAULT_PROVIDER);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.ai.base_url, "https://api.openai.com/v1");
        assert!(config.ai.api_key.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("PORT", "8088"),
                ("AI_PROVIDER", "Groq"),
                ("AI_API_KEY", "sk-test"),
            ]))
            .unwrap();

        assert_eq!(config.port, 8088);
        assert_eq!(config.ai.provider, "groq");
        assert_eq!(config.ai.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(config.ai.model, "llama-3.1-8b-instant");
        assert_eq!(config.ai.api_key, "sk-test");
    }

    #[test]
    fn test_env_base_url_beats_preset() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("AI_PROVIDER", "openai"),
                ("AI_BASE_URL", "http://localhost:11434/v1/"),
                ("AI_MODEL", "llama3"),
            ]))
            .unwrap();

        assert_eq!(config.ai.base_url, "http://localhost:11434/v1");
        assert_eq!(config.ai.model, "llama3");
    }

    #[test]
    fn test_invalid_port_is_error() {
        let mut config = AppConfig::default();
        assert!(config.apply_env(env(&[("PORT", "abc")])).is_err());
    }

    #[test]
    fn test_toml_file() {
        let mut config = AppConfig::default();
        config
            .apply_toml(
                r#"
                host = "0.0.0.0"
                port = 4100

                [ai]
                provider = "deepseek"
                api_key = "sk-file"
                "#,
            )
            .unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 4100);
        assert_eq!(config.ai.base_url, "https://api.deepseek.com/v1");
        assert_eq!(config.ai.api_key, "sk-file");
    }

    #[tokio::test]
    async fn test_bind_addr_resolves_names_and_literals() {
        let mut config = AppConfig::default();
        config.host = "0.0.0.0".to_string();
        config.port = 4100;
        assert_eq!(config.bind_addr().await.unwrap().to_string(), "0.0.0.0:4100");

        config.host = "localhost".to_string();
        let addr = config.bind_addr().await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 4100);

        config.host = "not a host".to_string();
        assert!(config.bind_addr().await.is_err());
    }

    #[test]
    fn test_provider_preset_lookup() {
        assert_eq!(provider_preset("OpenAI").map(|p| p.base_url), Some("https://api.openai.com/v1"));
        assert!(provider_preset("acme").is_none());
    }
}
