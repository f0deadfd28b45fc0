//! Helpers shared by the HTTP adapters.

use gateway_core::ProviderError;
use reqwest::Response;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Longest upstream error body kept in messages
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Object {
        message: String,
        #[serde(default, rename = "type")]
        kind: Option<String>,
    },
    Text(String),
}

/// Map a transport failure from `send()`
pub(crate) fn send_error(provider: &str, error: &reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::timeout(provider, timeout)
    } else {
        ProviderError::network(provider, format!("request failed: {error}"))
    }
}

/// Turn a non-2xx response into a classified error
pub(crate) async fn status_error(provider: &str, response: Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = extract_message(&body);

    warn!(provider = %provider, status, message = %message, "Upstream returned an error status");
    ProviderError::status(provider, status, message)
}

/// Decode a 2xx body, mapping failures to `MalformedResponse`
pub(crate) async fn decode_body<T>(provider: &str, response: Response, timeout: Duration) -> Result<T, ProviderError>
where
    T: serde::de::DeserializeOwned,
{
    let bytes = response
        .bytes()
        .await
        .map_err(|e| send_error(provider, &e, timeout))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ProviderError::malformed(provider, format!("failed to parse response: {e}")))
}

/// Pull a readable message out of a vendor error body
pub(crate) fn extract_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ErrorDetail::Object { message, kind },
        }) => match kind {
            Some(kind) => format!("{kind}: {message}"),
            None => message,
        },
        Ok(ErrorEnvelope {
            error: ErrorDetail::Text(message),
        }) => message,
        Err(_) => truncate(body.trim(), MAX_ERROR_BODY),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_message_shapes() {
        assert_eq!(
            extract_message(r#"{"error":{"type":"invalid_request_error","message":"bad model"}}"#),
            "invalid_request_error: bad model"
        );
        assert_eq!(extract_message(r#"{"error":{"message":"nope"}}"#), "nope");
        assert_eq!(extract_message(r#"{"error":"overloaded"}"#), "overloaded");
        assert_eq!(extract_message("  gateway timeout "), "gateway timeout");
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(2000);
        let msg = extract_message(&body);
        assert_eq!(msg.len(), MAX_ERROR_BODY + 3);
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://api.openai.com/v1/", "/chat/completions"), "https://api.openai.com/v1/chat/completions");
        assert_eq!(join_url("http://localhost:8000", "v1/messages"), "http://localhost:8000/v1/messages");
    }
}
