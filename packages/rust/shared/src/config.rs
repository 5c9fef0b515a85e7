//! Application configuration for colgen.
//!
//! User config lives at `~/.colgen/colgen.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ColgenError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "colgen.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".colgen";

/// Inclusive bounds on the worker pool size.
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 8;

// ---------------------------------------------------------------------------
// Enums shared by file config and runtime config
// ---------------------------------------------------------------------------

/// Which completion backend a run talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Hosted chat-completion API (OpenAI-compatible).
    #[default]
    Remote,
    /// Local inference server (Ollama-compatible).
    Local,
}

impl BackendKind {
    /// Remote backends are rate limited; only they get the inter-call delay.
    pub fn is_remote(self) -> bool {
        matches!(self, Self::Remote)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = ColgenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" | "openai" => Ok(Self::Remote),
            "local" | "ollama" => Ok(Self::Local),
            other => Err(ColgenError::config(format!(
                "unknown backend '{other}': expected 'remote' or 'local'"
            ))),
        }
    }
}

/// What the aggregator does when a row's provider call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Record the failed row, keep going, and commit every successful row.
    #[default]
    MarkRow,
    /// Abort the whole run on the first failure and write nothing.
    FailFast,
}

impl std::str::FromStr for FailurePolicy {
    type Err = ColgenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mark-row" | "mark" => Ok(Self::MarkRow),
            "fail-fast" | "abort" => Ok(Self::FailFast),
            other => Err(ColgenError::config(format!(
                "unknown failure policy '{other}': expected 'mark-row' or 'fail-fast'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Config structs (matching colgen.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend selection and connection settings.
    #[serde(default)]
    pub provider: ProviderSection,

    /// Batch run defaults.
    #[serde(default)]
    pub run: RunSection,

    /// Template library settings.
    #[serde(default)]
    pub templates: TemplatesSection,
}

/// `[provider]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    /// Backend used when the CLI does not override it.
    #[serde(default)]
    pub backend: BackendKind,

    /// Name of the env var holding the remote API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the remote chat-completion API.
    #[serde(default = "default_remote_base_url")]
    pub remote_base_url: String,

    /// Default model for the remote backend.
    #[serde(default = "default_remote_model")]
    pub remote_model: String,

    /// Base URL of the local inference server.
    #[serde(default = "default_local_url")]
    pub local_url: String,

    /// Default model for the local backend.
    #[serde(default = "default_local_model")]
    pub local_model: String,

    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            api_key_env: default_api_key_env(),
            remote_base_url: default_remote_base_url(),
            remote_model: default_remote_model(),
            local_url: default_local_url(),
            local_model: default_local_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_remote_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_remote_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_local_url() -> String {
    "http://localhost:11434".into()
}
fn default_local_model() -> String {
    "deepseek-r1:14b".into()
}
fn default_timeout_secs() -> u64 {
    120
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    /// Number of parallel workers (1–8).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Notify the observer every N processed rows.
    #[serde(default = "default_report_every")]
    pub report_every: usize,

    /// Sleep between calls within a worker (remote backends only).
    #[serde(default)]
    pub inter_call_delay: bool,

    /// Length of the inter-call sleep in ms.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Behavior when a row fails.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            report_every: default_report_every(),
            inter_call_delay: false,
            delay_ms: default_delay_ms(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_report_every() -> usize {
    10
}
fn default_delay_ms() -> u64 {
    500
}

/// `[templates]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplatesSection {
    /// Optional JSON file with user templates, loaded read-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_library: Option<String>,
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime batch configuration, fixed for the duration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Worker pool size.
    pub workers: usize,
    /// Reporting granularity in rows.
    pub report_every: usize,
    /// Whether the fixed inter-call delay is enabled.
    pub inter_call_delay: bool,
    /// Inter-call delay length.
    pub delay: Duration,
    /// Row failure handling.
    pub failure_policy: FailurePolicy,
}

impl RunConfig {
    /// Reject out-of-range values before any worker starts.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.workers) {
            return Err(ColgenError::validation(format!(
                "workers must be between {MIN_WORKERS} and {MAX_WORKERS}, got {}",
                self.workers
            )));
        }
        if self.report_every == 0 {
            return Err(ColgenError::validation("report_every must be at least 1"));
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            workers: config.run.workers,
            report_every: config.run.report_every,
            inter_call_delay: config.run.inter_call_delay,
            delay: Duration::from_millis(config.run.delay_ms),
            failure_policy: config.run.failure_policy,
        }
    }
}

/// Runtime connection settings for one backend.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Backend variant.
    pub backend: BackendKind,
    /// Model identifier sent with every request.
    pub model: String,
    /// Base URL the endpoint paths are joined onto.
    pub base_url: Url,
    /// Bearer token (remote backend only).
    pub api_key: Option<String>,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Build the runtime config for `backend` from the file config.
    ///
    /// The remote backend requires its API key env var to be set.
    pub fn from_app(config: &AppConfig, backend: BackendKind) -> Result<Self> {
        let section = &config.provider;
        if section.timeout_secs == 0 {
            return Err(ColgenError::config("provider timeout_secs must be at least 1"));
        }
        let (raw_url, model, api_key) = match backend {
            BackendKind::Remote => (
                section.remote_base_url.as_str(),
                section.remote_model.clone(),
                Some(resolve_api_key(config)?),
            ),
            BackendKind::Local => (section.local_url.as_str(), section.local_model.clone(), None),
        };

        let base_url = Url::parse(raw_url).map_err(|e| {
            ColgenError::config(format!("invalid {backend} base URL '{raw_url}': {e}"))
        })?;

        Ok(Self {
            backend,
            model,
            base_url,
            api_key,
            timeout: Duration::from_secs(section.timeout_secs),
        })
    }

    /// Override the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.colgen/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ColgenError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.colgen/colgen.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ColgenError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ColgenError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ColgenError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ColgenError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ColgenError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the remote API key from the configured env var.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.provider.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(ColgenError::config(format!(
            "remote API key not found. Set the {var_name} environment variable \
             or switch to the local backend (--backend local)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("local_url"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("mark-row"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.run.workers, 4);
        assert_eq!(parsed.provider.timeout_secs, 120);
        assert_eq!(parsed.provider.backend, BackendKind::Remote);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[provider]
backend = "local"
local_model = "llama3"

[run]
workers = 2
failure_policy = "fail-fast"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.provider.backend, BackendKind::Local);
        assert_eq!(config.provider.local_model, "llama3");
        assert_eq!(config.provider.local_url, "http://localhost:11434");
        assert_eq!(config.run.workers, 2);
        assert_eq!(config.run.report_every, 10);
        assert_eq!(config.run.failure_policy, FailurePolicy::FailFast);
    }

    #[test]
    fn run_config_from_app_config() {
        let run = RunConfig::from(&AppConfig::default());
        assert_eq!(run.workers, 4);
        assert_eq!(run.report_every, 10);
        assert!(!run.inter_call_delay);
        assert_eq!(run.delay, Duration::from_millis(500));
        assert!(run.validate().is_ok());
    }

    #[test]
    fn run_config_rejects_out_of_range() {
        let mut run = RunConfig::default();
        run.workers = 0;
        assert!(run.validate().is_err());
        run.workers = 9;
        assert!(run.validate().is_err());
        run.workers = 8;
        run.report_every = 0;
        assert!(run.validate().is_err());
    }

    #[test]
    fn backend_kind_parses_aliases() {
        assert_eq!("ollama".parse::<BackendKind>().unwrap(), BackendKind::Local);
        assert_eq!("Remote".parse::<BackendKind>().unwrap(), BackendKind::Remote);
        assert!("grpc".parse::<BackendKind>().is_err());
        assert!(BackendKind::Remote.is_remote());
        assert!(!BackendKind::Local.is_remote());
    }

    #[test]
    fn local_provider_config_needs_no_key() {
        let config = AppConfig::default();
        let provider = ProviderConfig::from_app(&config, BackendKind::Local).unwrap();
        assert_eq!(provider.base_url.as_str(), "http://localhost:11434/");
        assert_eq!(provider.model, "deepseek-r1:14b");
        assert!(provider.api_key.is_none());
        assert_eq!(provider.timeout, Duration::from_secs(120));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = AppConfig::default();
        config.provider.timeout_secs = 0;
        let err = ProviderConfig::from_app(&config, BackendKind::Local).unwrap_err();
        assert!(err.to_string().contains("timeout_secs must be at least 1"));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.provider.api_key_env = "COLGEN_TEST_NONEXISTENT_KEY_12345".into();
        let result = ProviderConfig::from_app(&config, BackendKind::Remote);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
