use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::application::services::{BackoffPolicy, ServiceConfig};

/// Default filename used to persist configuration within the config directory.
const CONFIG_FILENAME: &str = "config.json";

/// Where cluster state is read from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum ClusterSource {
    /// In-cluster credentials when running inside a pod, otherwise `kubectl proxy` on
    /// localhost.
    #[default]
    Auto,
    /// Service-account token and CA mounted into the pod.
    InCluster,
    /// Any reachable API server, e.g. `kubectl proxy` or a cluster endpoint with a token.
    External {
        api_url: String,
        /// Name of the environment variable holding a bearer token.
        #[serde(default)]
        token_env: Option<String>,
        #[serde(default)]
        ca_cert_path: Option<PathBuf>,
        #[serde(default)]
        accept_invalid_certs: bool,
    },
    /// Directory of kubectl-style `<plural>.json` list files.
    Fixture { dir: PathBuf },
}

impl ClusterSource {
    pub fn id(&self) -> &'static str {
        match self {
            ClusterSource::Auto => "auto",
            ClusterSource::InCluster => "in-cluster",
            ClusterSource::External { .. } => "external",
            ClusterSource::Fixture { .. } => "fixture",
        }
    }
}

/// Chat-completions backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub selector_temperature: f32,
    pub selector_max_tokens: u32,
    pub answer_temperature: f32,
    pub answer_max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            selector_temperature: 0.0,
            selector_max_tokens: 64,
            answer_temperature: 0.1,
            answer_max_tokens: 256,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextConfig {
    pub max_bytes: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_bytes: ServiceConfig::default().max_context_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

/// Complete persisted configuration payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub cluster: ClusterSource,
    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    /// Pipeline tunables derived from this configuration.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            backoff: BackoffPolicy::new(
                self.backoff.max_attempts,
                Duration::from_millis(self.backoff.base_delay_ms),
            ),
            max_context_bytes: self.context.max_bytes.max(1),
            selector_temperature: self.llm.selector_temperature,
            selector_max_tokens: self.llm.selector_max_tokens,
            answer_temperature: self.llm.answer_temperature,
            answer_max_tokens: self.llm.answer_max_tokens,
        }
    }

    /// Apply `KUBEQUERY_*` overrides. `lookup` resolves a variable name to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(host) = non_empty("KUBEQUERY_SERVICE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty("KUBEQUERY_SERVICE_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(dir) = non_empty("KUBEQUERY_FIXTURE_DIR") {
            self.cluster = ClusterSource::Fixture { dir: dir.into() };
        }
        if let Some(model) = non_empty("KUBEQUERY_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(endpoint) = non_empty("KUBEQUERY_LLM_ENDPOINT") {
            self.llm.endpoint = endpoint;
        }
    }
}

/// Thread-safe manager responsible for loading and persisting `AppConfig`.
pub struct ConfigManager {
    path: PathBuf,
    state: RwLock<AppConfig>,
}

impl ConfigManager {
    /// Load `<config_dir>/config.json`, falling back to defaults when it is missing or
    /// unreadable, then apply environment overrides.
    pub fn load(config_dir: impl AsRef<Path>) -> Self {
        Self::load_with(config_dir, |name| std::env::var(name).ok())
    }

    pub fn load_with(
        config_dir: impl AsRef<Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let path = config_dir.as_ref().join(CONFIG_FILENAME);
        let mut config = if path.exists() {
            fs::read(&path)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<AppConfig>(&bytes).ok())
                .unwrap_or_default()
        } else {
            AppConfig::default()
        };
        config.apply_overrides(lookup);

        Self {
            path,
            state: RwLock::new(config),
        }
    }

    /// Snapshot of the current configuration.
    pub fn current(&self) -> AppConfig {
        self.state.read().clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current configuration to disk, creating the directory if needed.
    pub fn persist(&self) -> std::io::Result<()> {
        let config = self.state.read();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(&*config)?;
        fs::write(&self.path, payload)
    }
}
