//! Wire-level adapter tests against mock vendor servers.

use gateway_core::{
    AdapterFactory, CompletionRequest, ProviderAdapter, ProviderDescriptor, ProviderErrorKind,
};
use gateway_providers::{AnthropicAdapter, AnthropicConfig, HttpAdapterFactory, OpenAiCompatAdapter, OpenAiCompatConfig};
use reqwest::Client;
use secrecy::SecretString;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn openai_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
    })
}

fn anthropic_body(content: &str) -> serde_json::Value {
    json!({
        "id": "msg_1",
        "type": "message",
        "role": "assistant",
        "model": "claude-sonnet-4-5-20250929",
        "content": [{"type": "text", "text": content}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 11, "output_tokens": 5}
    })
}

fn openai_adapter(server: &MockServer, timeout: Duration) -> OpenAiCompatAdapter {
    let config = OpenAiCompatConfig::new("openai", format!("{}/v1", server.uri()), "sk-test")
        .with_timeout(timeout);
    OpenAiCompatAdapter::new(config, Client::new())
}

fn anthropic_adapter(server: &MockServer) -> AnthropicAdapter {
    let config = AnthropicConfig::new("claude", "sk-ant-test").with_base_url(server.uri());
    AnthropicAdapter::new(config, Client::new())
}

#[tokio::test]
async fn openai_success_uses_bearer_and_vendor_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 64})))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body("hi there")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = openai_adapter(&server, Duration::from_secs(5));
    let request = CompletionRequest::new("gpt-4o-mini", "hello")
        .with_max_tokens(gateway_core::MaxTokens::new(64).unwrap());
    let completion = adapter.complete(&request).await.unwrap();

    assert_eq!(completion.content, "hi there");
    assert_eq!(completion.input_tokens, 9);
    assert_eq!(completion.output_tokens, 3);
    assert!(!completion.usage_estimated);
}

#[tokio::test]
async fn openai_json_mode_sets_response_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"response_format": {"type": "json_object"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body("{\"ok\":true}")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = openai_adapter(&server, Duration::from_secs(5));
    let request = CompletionRequest::new("gpt-4o-mini", "give json").with_json_mode(true);
    let completion = adapter.complete(&request).await.unwrap();
    assert_eq!(completion.content, "{\"ok\":true}");
}

#[tokio::test]
async fn openai_status_codes_are_classified() {
    let cases = [
        (401, ProviderErrorKind::Authentication, false),
        (400, ProviderErrorKind::InvalidRequest { status: 400 }, false),
        (429, ProviderErrorKind::Upstream { status: 429 }, true),
        (503, ProviderErrorKind::Upstream { status: 503 }, true),
    ];

    for (status, expected, transient) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": {"type": "some_error", "message": format!("status {status}")}
            })))
            .mount(&server)
            .await;

        let adapter = openai_adapter(&server, Duration::from_secs(5));
        let err = adapter
            .complete(&CompletionRequest::new("gpt-4o-mini", "hello"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, expected, "status {status}");
        assert_eq!(err.is_transient(), transient, "status {status}");
        assert!(err.message.contains(&format!("status {status}")));
    }
}

#[tokio::test]
async fn openai_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let adapter = openai_adapter(&server, Duration::from_secs(5));
    let err = adapter
        .complete(&CompletionRequest::new("gpt-4o-mini", "hello"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::MalformedResponse);
    assert!(!err.is_transient());
}

#[tokio::test]
async fn openai_timeout_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(openai_body("late"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let adapter = openai_adapter(&server, Duration::from_millis(50));
    let err = adapter
        .complete(&CompletionRequest::new("gpt-4o-mini", "hello"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::Timeout);
    assert!(err.is_transient());
}

#[tokio::test]
async fn openai_connection_refused_is_network() {
    let config = OpenAiCompatConfig::new("openai", "http://127.0.0.1:1/v1", "k")
        .with_timeout(Duration::from_secs(2));
    let adapter = OpenAiCompatAdapter::new(config, Client::new());

    let err = adapter
        .complete(&CompletionRequest::new("gpt-4o-mini", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err.kind, ProviderErrorKind::Network | ProviderErrorKind::Timeout));
    assert!(err.is_transient());
}

#[tokio::test]
async fn anthropic_success_sends_version_and_key_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({"system": "be brief"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_body("Hello!")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = anthropic_adapter(&server);
    let request = CompletionRequest::new("claude-sonnet-4-5-20250929", "hello").with_system("be brief");
    let completion = adapter.complete(&request).await.unwrap();

    assert_eq!(completion.content, "Hello!");
    assert_eq!(completion.input_tokens, 11);
    assert_eq!(completion.output_tokens, 5);
}

#[tokio::test]
async fn anthropic_overloaded_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_json(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .mount(&server)
        .await;

    let err = anthropic_adapter(&server)
        .complete(&CompletionRequest::new("claude-sonnet-4-5-20250929", "hello"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::Upstream { status: 529 });
    assert!(err.is_transient());
    assert_eq!(err.message, "overloaded_error: Overloaded");
}

#[tokio::test]
async fn factory_adapters_reach_custom_base_urls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("api-key", "azure-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body("from proxy")))
        .expect(1)
        .mount(&server)
        .await;

    let descriptor = ProviderDescriptor {
        name: "corp-proxy".to_string(),
        display_name: "Corp proxy".to_string(),
        api_key: SecretString::new("azure-key".to_string()),
        base_url: Some(format!("{}/v1", server.uri())),
        models: vec!["gpt-4o".to_string()],
        priority: 1,
        rate_limit_rpm: 0,
        rate_limit_tpm: 0,
        settings: Some(gateway_core::ProviderSettings::OpenAiCompatible {
            default_model: None,
            auth: Some(gateway_core::AuthScheme::Header {
                name: "api-key".to_string(),
            }),
            organization: None,
            max_output_tokens: None,
        }),
        extra_config: serde_json::Map::new(),
    };

    let factory = HttpAdapterFactory::new(Duration::from_secs(5), Duration::from_secs(2)).unwrap();
    let adapter = factory.build(&descriptor).unwrap();
    let completion = adapter
        .complete(&CompletionRequest::new("gpt-4o", "hello"))
        .await
        .unwrap();
    assert_eq!(completion.content, "from proxy");
}
