//! Scripted in-process backend for tests and dry runs.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use colgen_shared::{BackendKind, ProviderError};

use crate::{BoxFut, CompletionBackend, CompletionRequest};

type Responder =
    Arc<dyn Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync + 'static>;

/// A backend whose answers come from a closure.
///
/// Every request is recorded so tests can assert on what was sent.
#[derive(Clone)]
pub struct MockBackend {
    kind: BackendKind,
    latency: Option<Duration>,
    responder: Responder,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
    models: Vec<String>,
}

impl MockBackend {
    pub fn new(
        responder: impl Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: BackendKind::Local,
            latency: None,
            responder: Arc::new(responder),
            calls: Arc::new(Mutex::new(Vec::new())),
            models: vec!["mock".into()],
        }
    }

    /// Answers `echo: <prompt>`.
    pub fn echo() -> Self {
        Self::new(|req| Ok(format!("echo: {}", req.prompt)))
    }

    /// Always fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sleep before answering each call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_models(mut self, models: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Requests seen so far, in arrival order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl CompletionBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> BoxFut<'a, Result<String, ProviderError>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            (self.responder)(request)
        })
    }

    fn list_models(&self) -> BoxFut<'_, Result<Vec<String>, ProviderError>> {
        Box::pin(async move { Ok(self.models.clone()) })
    }

    fn ping(&self) -> BoxFut<'_, Result<(), ProviderError>> {
        Box::pin(async { Ok(()) })
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("kind", &self.kind)
            .field("calls", &self.call_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_scripts_failures() {
        let mock = MockBackend::failing(ProviderError::Network("down".into()));
        let req = CompletionRequest {
            system: "s".into(),
            prompt: "p".into(),
            model: "m".into(),
        };
        let err = mock.complete(&req).await.unwrap_err();
        assert_eq!(err.to_string(), "network error: down");
        assert_eq!(mock.calls(), vec![req]);
        assert_eq!(mock.list_models().await.unwrap(), vec!["mock"]);
    }
}
