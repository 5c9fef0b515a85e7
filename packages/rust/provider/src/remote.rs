//! OpenAI-compatible chat-completion backend.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use colgen_shared::{BackendKind, ColgenError, ProviderConfig, ProviderError, Result};

use crate::http::{build_client, endpoint, send_json, text_at, transport_error};
use crate::{BoxFut, CompletionBackend, CompletionRequest};

/// Sampling temperature for every remote call.
const TEMPERATURE: f64 = 0.7;

/// Hosted chat API reached with a bearer key.
#[derive(Debug, Clone)]
pub struct RemoteChatBackend {
    client: Client,
    base_url: Url,
    api_key: String,
    timeout: Duration,
}

impl RemoteChatBackend {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ColgenError::config("remote backend requires an API key"))?;
        Ok(Self {
            client: build_client(config.timeout)?,
            base_url: config.base_url.clone(),
            api_key,
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
            "temperature": TEMPERATURE,
        });

        let response = send_json(
            self.client
                .post(endpoint(&self.base_url, "chat/completions"))
                .bearer_auth(&self.api_key)
                .json(&body),
            self.timeout,
        )
        .await?;

        text_at(&response, "/choices/0/message/content")
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::MalformedResponse("missing choices[0].message.content".into())
            })
    }

    async fn models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let response = send_json(
            self.client
                .get(endpoint(&self.base_url, "models"))
                .bearer_auth(&self.api_key),
            self.timeout,
        )
        .await?;

        let ids = response
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::MalformedResponse("missing data[]".into()))?
            .iter()
            .filter_map(|m| m.get("id").and_then(Value::as_str).map(str::to_string))
            .collect();
        Ok(ids)
    }

    async fn check(&self) -> std::result::Result<(), ProviderError> {
        let response = self
            .client
            .get(endpoint(&self.base_url, "models"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let status = response.status();
        if status.is_success() {
            debug!(%status, "remote backend reachable");
            Ok(())
        } else {
            Err(ProviderError::status(status.as_u16(), ""))
        }
    }
}

impl CompletionBackend for RemoteChatBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> RemoteChatBackend {
        let config = ProviderConfig {
            backend: BackendKind::Remote,
            model: "gpt-test".into(),
            base_url: Url::parse(&format!("{}/v1", server.uri())).unwrap(),
            api_key: Some("sk-test".into()),
            timeout: Duration::from_secs(5),
        };
        RemoteChatBackend::new(&config).unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "sys".into(),
            prompt: "hello".into(),
            model: "gpt-test".into(),
        }
    }

    #[tokio::test]
    async fn posts_chat_and_reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-test",
                "temperature": 0.7,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "world"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = backend_for(&server).complete(&request()).await.unwrap();
        assert_eq!(out, "world");
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = backend_for(&server).complete(&request()).await.unwrap_err();
        match err {
            ProviderError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = backend_for(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(json!({"choices": [{"message": {"content": "late"}}]})),
            )
            .mount(&server)
            .await;

        let config = ProviderConfig {
            backend: BackendKind::Remote,
            model: "gpt-test".into(),
            base_url: Url::parse(&server.uri()).unwrap(),
            api_key: Some("sk-test".into()),
            timeout: Duration::from_millis(200),
        };
        let backend = RemoteChatBackend::new(&config).unwrap();
        let err = backend.complete(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn lists_model_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "gpt-4o"}, {"id": "gpt-3.5-turbo"}]
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        assert_eq!(backend.list_models().await.unwrap(), vec!["gpt-4o", "gpt-3.5-turbo"]);
        assert!(backend.ping().await.is_ok());
    }

    #[test]
    fn api_key_is_required() {
        let config = ProviderConfig {
            backend: BackendKind::Remote,
            model: "m".into(),
            base_url: Url::parse("https://api.example.com/v1").unwrap(),
            api_key: None,
            timeout: Duration::from_secs(1),
        };
        assert!(RemoteChatBackend::new(&config).is_err());
    }
}
