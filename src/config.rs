use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::{EcoOpsError, Result};

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LOG_LEVEL: &str = "ecoops_pipeline=info,ecoops=info,tower_http=info";

/// Main configuration structure loaded from ecoops.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// HTTP transport settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub path: String,
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            path: "/api/analyze".to_string(),
            cors_allow_any: true,
        }
    }
}

/// Model defaults shared by both providers
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    pub temperature: f32,
    pub groq_model: String,
    pub openai_model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            groq_model: "llama-3.3-70b-versatile".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Which backend answers stage prompts. Groq is preferred when its key is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Groq,
    OpenAi,
}

impl ProviderKind {
    pub fn label(self) -> &'static str {
        match self {
            ProviderKind::Groq => "groq",
            ProviderKind::OpenAi => "openai",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Groq => GROQ_BASE_URL,
            ProviderKind::OpenAi => OPENAI_BASE_URL,
        }
    }
}

/// Resolved backend selection, handed to the chat client as-is.
#[derive(Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl ProviderConfig {
    /// Pick a provider from available credentials.
    ///
    /// `GROQ_API_KEY` wins over `OPENAI_API_KEY`. `ECOOPS_MODEL` and `ECOOPS_LLM_BASE_URL`
    /// override the per-provider defaults. Blank keys count as absent.
    pub fn resolve<F>(model: &ModelConfig, lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let (kind, api_key) = if let Some(key) = non_blank("GROQ_API_KEY") {
            (ProviderKind::Groq, key)
        } else if let Some(key) = non_blank("OPENAI_API_KEY") {
            (ProviderKind::OpenAi, key)
        } else {
            return None;
        };

        let default_model = match kind {
            ProviderKind::Groq => model.groq_model.clone(),
            ProviderKind::OpenAi => model.openai_model.clone(),
        };

        Some(Self {
            kind,
            api_key: api_key.trim().to_string(),
            model: non_blank("ECOOPS_MODEL").unwrap_or(default_model),
            base_url: non_blank("ECOOPS_LLM_BASE_URL")
                .unwrap_or_else(|| kind.default_base_url().to_string()),
            temperature: model.temperature,
        })
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub provider: Option<ProviderConfig>,
    pub bearer_token: Option<String>,
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider: None,
            bearer_token: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Load `ECOOPS_ENV_FILE` (or `.env`) into the process environment. Existing variables win.
/// Safe to call more than once.
pub fn load_env_file() {
    if let Ok(env_path) = std::env::var("ECOOPS_ENV_FILE") {
        let _ = dotenvy::from_path(env_path);
    } else {
        let _ = dotenvy::dotenv();
    }
}

/// Tracing filter directives: `RUST_LOG` when set and non-blank, else the crate default.
pub fn log_filter<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup("RUST_LOG")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses ECOOPS_CONFIG environment variable or defaults to "ecoops.toml"
    pub fn load() -> Result<Self> {
        load_env_file();

        let config_path =
            std::env::var("ECOOPS_CONFIG").unwrap_or_else(|_| "ecoops.toml".to_string());

        let file_contents = match std::fs::read_to_string(&config_path) {
            Ok(content) => Some(content),
            Err(_) => {
                tracing::warn!("Config file {} not found, using defaults", config_path);
                None
            }
        };

        Self::from_sources(file_contents.as_deref(), |key| std::env::var(key).ok())
    }

    /// Build a config from optional TOML text plus a variable lookup.
    pub fn from_sources<F>(toml_text: Option<&str>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = match toml_text {
            Some(text) => toml::from_str(text)?,
            None => Self::default(),
        };

        if let Some(bind) = lookup("ECOOPS_HTTP_BIND") {
            config.server.bind = bind.parse().map_err(|e| EcoOpsError::Config {
                message: format!("ECOOPS_HTTP_BIND '{}' is not a socket address: {}", bind, e),
            })?;
        }
        if let Some(path) = lookup("ECOOPS_HTTP_PATH") {
            config.server.path = path;
        }
        if !config.server.path.starts_with('/') {
            config.server.path = format!("/{}", config.server.path);
        }

        if let Some(t) = lookup("ECOOPS_TEMPERATURE").and_then(|v| v.parse::<f32>().ok()) {
            config.model.temperature = t;
        }
        if !(0.0..=2.0).contains(&config.model.temperature) {
            tracing::warn!(
                "temperature {} outside [0, 2], clamping",
                config.model.temperature
            );
            config.model.temperature = config.model.temperature.clamp(0.0, 2.0);
        }

        config.runtime = RuntimeConfig {
            provider: ProviderConfig::resolve(&config.model, &lookup),
            bearer_token: lookup("ECOOPS_BEARER_TOKEN").filter(|t| !t.trim().is_empty()),
            log_level: log_filter(&lookup),
        };

        match &config.runtime.provider {
            Some(p) => tracing::debug!("model provider resolved: {} ({})", p.kind.label(), p.model),
            None => tracing::warn!("no GROQ_API_KEY or OPENAI_API_KEY set; analysis runs will fail"),
        }

        Ok(config)
    }

    /// The resolved provider, or a config error if no credentials were found.
    pub fn require_provider(&self) -> Result<&ProviderConfig> {
        self.runtime
            .provider
            .as_ref()
            .ok_or_else(|| EcoOpsError::Config {
                message: "set GROQ_API_KEY or OPENAI_API_KEY to enable analysis".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn groq_preferred_over_openai() {
        let lookup = lookup_from(&[("GROQ_API_KEY", "gsk"), ("OPENAI_API_KEY", "sk")]);
        let p = ProviderConfig::resolve(&ModelConfig::default(), lookup).unwrap();
        assert_eq!(p.kind, ProviderKind::Groq);
        assert_eq!(p.model, "llama-3.3-70b-versatile");
        assert_eq!(p.base_url, GROQ_BASE_URL);
    }

    #[test]
    fn openai_used_when_groq_key_blank() {
        let lookup = lookup_from(&[("GROQ_API_KEY", "  "), ("OPENAI_API_KEY", "sk")]);
        let p = ProviderConfig::resolve(&ModelConfig::default(), lookup).unwrap();
        assert_eq!(p.kind, ProviderKind::OpenAi);
        assert_eq!(p.model, "gpt-4o-mini");
    }

    #[test]
    fn no_credentials_resolves_to_none() {
        let config = Config::from_sources(None, lookup_from(&[])).unwrap();
        assert!(config.runtime.provider.is_none());
        assert!(config.require_provider().is_err());
    }

    #[test]
    fn env_overrides_toml() {
        let toml_text = r#"
            [server]
            bind = "0.0.0.0:8080"
            path = "analyze"

            [model]
            temperature = 5.0
        "#;
        let lookup = lookup_from(&[
            ("OPENAI_API_KEY", "sk"),
            ("ECOOPS_MODEL", "gpt-4.1-mini"),
            ("ECOOPS_HTTP_BIND", "127.0.0.1:9999"),
        ]);
        let config = Config::from_sources(Some(toml_text), lookup).unwrap();
        assert_eq!(config.server.bind.port(), 9999);
        assert_eq!(config.server.path, "/analyze");
        assert_eq!(config.model.temperature, 2.0);
        let p = config.require_provider().unwrap();
        assert_eq!(p.model, "gpt-4.1-mini");
        assert_eq!(p.temperature, 2.0);
    }

    #[test]
    fn log_filter_matches_runtime_log_level() {
        assert_eq!(log_filter(lookup_from(&[])), DEFAULT_LOG_LEVEL);
        assert_eq!(log_filter(lookup_from(&[("RUST_LOG", " ")])), DEFAULT_LOG_LEVEL);
        let lookup = lookup_from(&[("RUST_LOG", "ecoops_pipeline=debug")]);
        assert_eq!(log_filter(&lookup), "ecoops_pipeline=debug");
        let config = Config::from_sources(None, lookup).unwrap();
        assert_eq!(config.runtime.log_level, "ecoops_pipeline=debug");
    }

    #[test]
    fn bad_bind_is_config_error() {
        let lookup = lookup_from(&[("ECOOPS_HTTP_BIND", "not-an-addr")]);
        let err = Config::from_sources(None, lookup).unwrap_err();
        assert!(matches!(err, EcoOpsError::Config { .. }));
    }

    #[test]
    fn debug_output_redacts_key() {
        let lookup = lookup_from(&[("GROQ_API_KEY", "super-secret")]);
        let p = ProviderConfig::resolve(&ModelConfig::default(), lookup).unwrap();
        assert!(!format!("{:?}", p).contains("super-secret"));
    }
}
