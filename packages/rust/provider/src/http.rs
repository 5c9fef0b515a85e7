//! HTTP plumbing shared by both backends.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use url::Url;

use colgen_shared::ProviderError;

/// User-Agent sent with every request.
const USER_AGENT: &str = concat!("colgen/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Client(format!("failed to build HTTP client: {e}")))
}

/// `{base}/{path}` without dropping a path prefix on the base (e.g. `/v1`).
pub(crate) fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Map a transport failure, keeping timeouts distinct.
pub(crate) fn transport_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// Send a request and decode a 2xx JSON body.
pub(crate) async fn send_json(
    request: RequestBuilder,
    timeout: Duration,
) -> Result<Value, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::status(status.as_u16(), &body));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(timeout)
            } else {
                ProviderError::MalformedResponse(format!("body is not JSON: {e}"))
            }
        })
}

/// Follow a JSON pointer to a string field.
pub(crate) fn text_at<'a>(body: &'a Value, pointer: &str) -> Option<&'a str> {
    body.pointer(pointer).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path() {
        let base = Url::parse("https://api.example.com/v1").unwrap();
        assert_eq!(endpoint(&base, "chat/completions"), "https://api.example.com/v1/chat/completions");

        let base = Url::parse("http://localhost:11434/").unwrap();
        assert_eq!(endpoint(&base, "/api/tags"), "http://localhost:11434/api/tags");
    }

    #[test]
    fn text_at_reads_nested_strings() {
        let body = serde_json::json!({"choices": [{"message": {"content": "hi"}}]});
        assert_eq!(text_at(&body, "/choices/0/message/content"), Some("hi"));
        assert_eq!(text_at(&body, "/choices/1/message/content"), None);
    }
}
