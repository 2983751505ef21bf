//! Provider configuration and factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use critic_core::engine::PanelEngineConfig;
use critic_core::traits::LlmProvider;

use crate::gemini::GeminiProvider;
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;

/// Configuration for a single LLM provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Gemini {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    /// Canned replies, for dry runs and tests.
    Mock {
        #[serde(default = "default_mock_response")]
        response: String,
        /// Prompt substring → reply.
        #[serde(default)]
        replies: HashMap<String, String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Gemini {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Gemini")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Mock { response, replies } => f
                .debug_struct("Mock")
                .field("response", response)
                .field("replies", &replies.len())
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_mock_response() -> String {
    "{}".to_string()
}

/// Top-level critic-panel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Default provider to use.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Default model to use.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Sampling temperature shared by every persona.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Output token cap per persona.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Upper bound on a single model call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Catalog to evaluate when none is given on the command line.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./critic-results")
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_timeout_secs(),
            output_dir: default_output_dir(),
            catalog: None,
        }
    }
}

impl CriticConfig {
    /// Engine settings for a run against `model`.
    pub fn engine_config(&self, model: &str) -> PanelEngineConfig {
        PanelEngineConfig {
            model: model.to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            system_prompt_override: None,
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::Gemini { api_key, base_url } => ProviderConfig::Gemini {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
        ProviderConfig::Mock { .. } => config.clone(),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `critic-panel.toml` in the current directory
/// 2. `~/.config/critic-panel/config.toml`
///
/// Environment variable overrides: `CRITIC_GEMINI_KEY`, then `GOOGLE_API_KEY`.
pub fn load_config() -> Result<CriticConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<CriticConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("critic-panel.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<CriticConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => CriticConfig::default(),
    };

    let env_key = std::env::var("CRITIC_GEMINI_KEY")
        .or_else(|_| std::env::var("GOOGLE_API_KEY"))
        .ok()
        .filter(|k| !k.is_empty());
    if let Some(key) = env_key {
        apply_gemini_key(&mut config, key);
    }

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();

    Ok(config)
}

fn apply_gemini_key(config: &mut CriticConfig, key: String) {
    let entry = config
        .providers
        .entry("gemini".into())
        .or_insert(ProviderConfig::Gemini {
            api_key: String::new(),
            base_url: None,
        });
    if let ProviderConfig::Gemini { api_key, .. } = entry {
        *api_key = key;
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("critic-panel"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(name: &str, config: &ProviderConfig) -> Result<Box<dyn LlmProvider>> {
    match config {
        ProviderConfig::Gemini { api_key, base_url } => {
            if api_key.is_empty() {
                anyhow::bail!(
                    "provider '{name}' has no API key; set CRITIC_GEMINI_KEY or GOOGLE_API_KEY"
                );
            }
            Ok(Box::new(GeminiProvider::new(api_key, base_url.clone())?))
        }
        ProviderConfig::Ollama { base_url } => Ok(Box::new(OllamaProvider::new(base_url)?)),
        ProviderConfig::Mock { response, replies } => {
            // Longest needle first
            let mut needles: Vec<_> = replies.iter().collect();
            needles.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));
            let provider = needles
                .into_iter()
                .fold(MockProvider::with_fixed_response(response), |p, (k, v)| {
                    p.on(k, v)
                });
            Ok(Box::new(provider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_CRITIC_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_CRITIC_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_CRITIC_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${_CRITIC_UNSET_VAR}"), "");
        assert_eq!(resolve_env_vars("no vars"), "no vars");
        assert_eq!(resolve_env_vars("broken ${OPEN"), "broken ${OPEN");
        std::env::remove_var("_CRITIC_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = CriticConfig::default();
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.default_model, "gemini-2.5-flash");
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tokens, 8192);
        assert_eq!(config.request_timeout_secs, 120);
        assert!(config.catalog.is_none());
    }

    #[test]
    fn parse_provider_config() {
        let toml_str = r#"
default_provider = "gemini"
default_model = "gemini-2.5-pro"
temperature = 0.2
catalog = "catalogs/bands.toml"

[providers.gemini]
type = "gemini"
api_key = "test-key"

[providers.ollama]
type = "ollama"

[providers.mock]
type = "mock"
response = '{"ratings": []}'
"#;
        let config: CriticConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.default_model, "gemini-2.5-pro");
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.max_tokens, 8192);
        assert_eq!(config.catalog, Some(PathBuf::from("catalogs/bands.toml")));
        assert!(matches!(
            config.providers.get("gemini"),
            Some(ProviderConfig::Gemini { .. })
        ));
        assert!(matches!(
            config.providers.get("ollama"),
            Some(ProviderConfig::Ollama { base_url }) if base_url == "http://localhost:11434"
        ));
    }

    #[test]
    fn debug_masks_api_key() {
        let config = ProviderConfig::Gemini {
            api_key: "super-secret".into(),
            base_url: None,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("critic-panel.toml");
        std::fs::write(
            &path,
            "default_provider = \"mock\"\nrequest_timeout_secs = 5\n\n[providers.mock]\ntype = \"mock\"\n",
        )
        .unwrap();

        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.default_provider, "mock");
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(
            config.engine_config("m").request_timeout,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn load_from_missing_path_fails() {
        let err = load_config_from(Some(Path::new("/nonexistent/critic-panel.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn env_key_fills_gemini_entry() {
        let mut config = CriticConfig::default();
        apply_gemini_key(&mut config, "from-env".into());
        assert!(matches!(
            config.providers.get("gemini"),
            Some(ProviderConfig::Gemini { api_key, .. }) if api_key == "from-env"
        ));
    }

    #[test]
    fn gemini_without_key_is_rejected() {
        let config = ProviderConfig::Gemini {
            api_key: String::new(),
            base_url: None,
        };
        let err = create_provider("gemini", &config).err().unwrap();
        assert!(err.to_string().contains("no API key"));
    }

    #[tokio::test]
    async fn mock_factory_honours_replies() {
        let mut replies = HashMap::new();
        replies.insert("metal".to_string(), "loud".to_string());
        replies.insert("metalhead".to_string(), "louder".to_string());
        let config = ProviderConfig::Mock {
            response: "quiet".into(),
            replies,
        };

        let provider = create_provider("mock", &config).unwrap();
        assert_eq!(provider.name(), "mock");

        let request = |prompt: &str| critic_core::traits::CompletionRequest {
            model: "m".into(),
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: 10,
            temperature: 0.7,
        };
        let reply = provider.complete(&request("a metalhead")).await.unwrap();
        assert_eq!(reply.content, "louder");
        let reply = provider.complete(&request("jazz")).await.unwrap();
        assert_eq!(reply.content, "quiet");
    }
}
