//! Completion backends and the provider adapter.
//!
//! Two interchangeable HTTP backends sit behind the object-safe
//! [`CompletionBackend`] trait:
//! - [`RemoteChatBackend`]: OpenAI-compatible `/chat/completions`
//! - [`LocalBackend`]: Ollama-compatible `/api/chat` with `/api/generate` fallback
//!
//! [`ProviderAdapter`] owns a backend plus the system-instruction policy and is
//! what the row task calls.

mod http;
mod local;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
mod remote;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use colgen_shared::clinical::mentions_blood_pressure;
use colgen_shared::{BackendKind, ProviderConfig, ProviderError, Result};

pub use local::{DEFAULT_LOCAL_MODELS, LocalBackend};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockBackend;
pub use remote::RemoteChatBackend;

/// Boxed future returned by backend methods so the trait stays object-safe.
pub type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Instruction sent with ordinary prompts.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a professional content generation assistant. \
Output only the final result, without any reasoning or commentary.";

/// Instruction sent when the prompt asks for a blood-pressure value.
pub const BLOOD_PRESSURE_SYSTEM_INSTRUCTION: &str = "You are a medical data extraction expert. \
Extract only the final data value, with no explanation, reasoning or extra words. \
For blood pressure return only a value formatted as '血压X/YmmHg'.";

/// One completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub model: String,
}

/// A text-completion service.
pub trait CompletionBackend: Send + Sync {
    /// Which backend family this is. Drives the inter-call delay decision.
    fn kind(&self) -> BackendKind;

    /// Run one completion and return the raw text.
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> BoxFut<'a, std::result::Result<String, ProviderError>>;

    /// Model identifiers the backend advertises.
    fn list_models(&self) -> BoxFut<'_, std::result::Result<Vec<String>, ProviderError>>;

    /// Cheap reachability check.
    fn ping(&self) -> BoxFut<'_, std::result::Result<(), ProviderError>>;
}

/// Build the HTTP backend described by `config`.
pub fn connect(config: &ProviderConfig) -> Result<Arc<dyn CompletionBackend>> {
    let backend: Arc<dyn CompletionBackend> = match config.backend {
        BackendKind::Remote => Arc::new(RemoteChatBackend::new(config)?),
        BackendKind::Local => Arc::new(LocalBackend::new(config)?),
    };
    debug!(backend = %config.backend, base_url = %config.base_url, "backend ready");
    Ok(backend)
}

/// Pick the system instruction for a rendered prompt.
pub fn system_instruction_for(prompt: &str) -> &'static str {
    if mentions_blood_pressure(prompt) {
        BLOOD_PRESSURE_SYSTEM_INSTRUCTION
    } else {
        DEFAULT_SYSTEM_INSTRUCTION
    }
}

/// A backend bound to one model, plus the system-instruction policy.
#[derive(Clone)]
pub struct ProviderAdapter {
    backend: Arc<dyn CompletionBackend>,
    model: String,
}

impl ProviderAdapter {
    pub fn new(backend: Arc<dyn CompletionBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }

    /// Connect to the backend in `config` and bind its model.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self::new(connect(config)?, config.model.clone()))
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn backend(&self) -> &Arc<dyn CompletionBackend> {
        &self.backend
    }

    /// Complete `prompt` with the policy-selected system instruction.
    pub async fn complete(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        let request = CompletionRequest {
            system: system_instruction_for(prompt).to_string(),
            prompt: prompt.to_string(),
            model: self.model.clone(),
        };
        self.backend.complete(&request).await
    }
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("kind", &self.kind())
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blood_pressure_prompts_get_strict_instruction() {
        assert_eq!(
            system_instruction_for("提取血压"),
            BLOOD_PRESSURE_SYSTEM_INSTRUCTION
        );
        assert_eq!(
            system_instruction_for("Find the Diastolic value"),
            BLOOD_PRESSURE_SYSTEM_INSTRUCTION
        );
        assert_eq!(system_instruction_for("Summarize"), DEFAULT_SYSTEM_INSTRUCTION);
    }

    #[tokio::test]
    async fn adapter_forwards_model_and_instruction() {
        let mock = Arc::new(MockBackend::echo());
        let adapter = ProviderAdapter::new(mock.clone(), "m1");

        let out = adapter.complete("收缩压是多少").await.unwrap();
        assert_eq!(out, "echo: 收缩压是多少");

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "m1");
        assert_eq!(calls[0].system, BLOOD_PRESSURE_SYSTEM_INSTRUCTION);
    }

    #[test]
    fn connect_builds_the_configured_backend() {
        let config = ProviderConfig {
            backend: BackendKind::Local,
            model: "llama3".into(),
            base_url: url::Url::parse("http://localhost:11434").unwrap(),
            api_key: None,
            timeout: std::time::Duration::from_secs(5),
        };
        let adapter = ProviderAdapter::from_config(&config).unwrap();
        assert_eq!(adapter.kind(), BackendKind::Local);
        assert_eq!(adapter.model(), "llama3");
    }
}
