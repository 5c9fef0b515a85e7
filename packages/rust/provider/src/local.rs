//! Ollama-compatible local inference backend.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use colgen_shared::{BackendKind, ProviderConfig, ProviderError, Result};

use crate::http::{build_client, endpoint, send_json, text_at, transport_error};
use crate::{BoxFut, CompletionBackend, CompletionRequest};

/// Models offered when the server cannot be asked.
pub const DEFAULT_LOCAL_MODELS: &[&str] = &[
    "deepseek-r1:14b",
    "llama3",
    "llama2",
    "mistral",
    "gemma",
    "qwen",
    "yi",
];

/// Local inference server, no authentication.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl LocalBackend {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout)?,
            base_url: config.base_url.clone(),
            timeout: config.timeout,
        })
    }

    async fn chat(&self, request: &CompletionRequest) -> std::result::Result<String, ProviderError> {
        let body = json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt},
            ],
            "stream": false,
        });

        let response = match send_json(
            self.client
                .post(endpoint(&self.base_url, "api/chat"))
                .json(&body),
            self.timeout,
        )
        .await
        {
            Ok(response) => response,
            Err(ProviderError::Status { status, .. }) => {
                debug!(status, "chat endpoint rejected request, falling back to generate");
                return self.generate(request).await;
            }
            Err(e) => return Err(e),
        };

        text_at(&response, "/message/content")
            .or_else(|| text_at(&response, "/response"))
            .map(str::to_string)
            .ok_or_else(|| ProviderError::MalformedResponse("missing message.content".into()))
    }

    async fn generate(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<String, ProviderError> {
        let body = json!({
            "model": request.model,
            "prompt": format!("{}\n\n{}", request.system, request.prompt),
            "stream": false,
        });

        let response = send_json(
            self.client
                .post(endpoint(&self.base_url, "api/generate"))
                .json(&body),
            self.timeout,
        )
        .await?;

        text_at(&response, "/response")
            .map(str::to_string)
            .ok_or_else(|| ProviderError::MalformedResponse("missing response".into()))
    }

    /// Try `/api/tags`, then the legacy `/api/models`.
    async fn models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        match self.model_names("api/tags").await {
            Ok(names) if !names.is_empty() => return Ok(names),
            Ok(_) => debug!("api/tags listed no models, trying api/models"),
            Err(e) => warn!(error = %e, "api/tags failed, trying api/models"),
        }
        self.model_names("api/models").await
    }

    async fn model_names(&self, path: &str) -> std::result::Result<Vec<String>, ProviderError> {
        let response = send_json(
            self.client.get(endpoint(&self.base_url, path)),
            self.timeout,
        )
        .await?;

        let names = response
            .get("models")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::MalformedResponse(format!("{path}: missing models[]")))?
            .iter()
            .filter_map(|m| m.get("name").and_then(Value::as_str).map(str::to_string))
            .collect();
        Ok(names)
    }

    async fn check(&self) -> std::result::Result<(), ProviderError> {
        let response = self
            .client
            .get(self.base_url.clone())
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let status = response.status();
        if status.is_success() {
            debug!(%status, "local backend reachable");
            Ok(())
        } else {
            Err(ProviderError::status(status.as_u16(), ""))
        }
    }
}

impl CompletionBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> BoxFut<'a, std::result::Result<String, ProviderError>> {
        Box::pin(self.chat(request))
    }

    fn list_models(&self) -> BoxFut<'_, std::result::Result<Vec<String>, ProviderError>> {
        Box::pin(self.models())
    }

    fn ping(&self) -> BoxFut<'_, std::result::Result<(), ProviderError>> {
        Box::pin(self.check())
    }
}
