//! End-to-end streaming through the gateway against a mock vendor.

mod common;

use common::{openai_chunk, sse_body, MockServerFixture, TEST_KEY};
use ghosttype_gateway::config::AuthMode;
use ghosttype_gateway::registry::ProviderId;
use ghosttype_gateway::{Error, Message, UnifiedRequest, UserConfig};
use mockito::Matcher;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

fn ask(text: &str) -> UnifiedRequest {
    UnifiedRequest::builder()
        .request_id("req-fixed")
        .mode("ask")
        .system_prompt("Be brief.")
        .message(Message::user(text))
        .build()
}

async fn run(
    fixture: &MockServerFixture,
    config: &UserConfig,
    request: &UnifiedRequest,
) -> (ghosttype_gateway::Result<ghosttype_gateway::GenerationOutput>, Vec<String>) {
    let mut tokens = Vec::new();
    let result = fixture
        .gateway
        .stream_generate(
            config,
            request,
            |t| tokens.push(t.to_string()),
            &CancellationToken::new(),
        )
        .await;
    (result, tokens)
}

#[tokio::test]
async fn test_openai_chat_stream_delivers_tokens_in_order() {
    let mut fx = MockServerFixture::new().await;
    let body = sse_body(
        &[
            openai_chunk("Hel").as_str(),
            openai_chunk("lo").as_str(),
            openai_chunk(" world").as_str(),
        ],
        true,
    );
    let mock = fx
        .server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", format!("Bearer {}", TEST_KEY).as_str())
        .match_header("accept", "text/event-stream")
        .match_header("x-client-request-id", "req-fixed")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-4o-mini",
            "stream": true,
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Hi"}
            ]
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_header("x-request-id", "req_upstream_1")
        .with_body(body)
        .expect(1)
        .create_async()
        .await;

    let config = fx.builtin(ProviderId::OpenAi);
    let (result, tokens) = run(&fx, &config, &ask("Hi")).await;
    let out = result.unwrap();

    assert_eq!(tokens, vec!["Hel", "lo", " world"]);
    assert_eq!(out.output, "Hello world");
    assert!(out.first_token_latency_ms.is_some());
    assert_eq!(out.output_language_policy, "Auto");
    assert_eq!(out.stats.provider_id, "openai");
    assert_eq!(out.stats.model, "gpt-4o-mini");
    assert_eq!(out.stats.attempts, 1);
    assert_eq!(out.stats.http_status, 200);
    assert_eq!(out.stats.client_request_id, "req-fixed");
    assert_eq!(out.stats.upstream_request_id.as_deref(), Some("req_upstream_1"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_cumulative_snapshots_are_reconciled() {
    let mut fx = MockServerFixture::new().await;
    let body = sse_body(
        &[
            openai_chunk("Hel").as_str(),
            openai_chunk("Hello").as_str(),
            openai_chunk("Hello").as_str(),
            openai_chunk("Hello there").as_str(),
        ],
        true,
    );
    let _mock = fx
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let config = fx.builtin(ProviderId::Groq);
    let (result, tokens) = run(&fx, &config, &ask("Hi")).await;

    assert_eq!(result.unwrap().output, "Hello there");
    assert_eq!(tokens, vec!["Hel", "Hello", "Hello there"]);
}

#[tokio::test]
async fn test_gemini_stream_uses_sse_query_and_model_path() {
    let mut fx = MockServerFixture::new().await;
    let chunk = |t: &str| json!({"candidates": [{"content": {"role": "model", "parts": [{"text": t}]}}]}).to_string();
    let body = sse_body(&[chunk("Bonjour").as_str(), chunk(" à tous").as_str()], false);
    let mock = fx
        .server
        .mock("POST", "/v1beta/models/gemini-2.0-flash:streamGenerateContent")
        .match_query(Matcher::UrlEncoded("alt".into(), "sse".into()))
        .match_header("x-goog-api-key", TEST_KEY)
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::PartialJson(json!({
            "system_instruction": {"parts": [{"text": "Be brief."}]},
            "contents": [{"role": "user", "parts": [{"text": "Hi"}]}]
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let config = fx.builtin(ProviderId::Gemini);
    let (result, tokens) = run(&fx, &config, &ask("Hi")).await;

    assert_eq!(result.unwrap().output, "Bonjour à tous");
    assert_eq!(tokens.len(), 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_anthropic_stream_skips_non_text_events() {
    let mut fx = MockServerFixture::new().await;
    let body = sse_body(
        &[
            "event: message_start",
            r#"data: {"type":"message_start","message":{"id":"msg_1"}}"#,
            "event: content_block_delta",
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Sure"}}"#,
            r#"data: {"type":"ping"}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":", done."}}"#,
            r#"data: {"type":"message_stop"}"#,
        ],
        false,
    );
    let mock = fx
        .server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", TEST_KEY)
        .match_header("anthropic-version", "2023-06-01")
        .match_body(Matcher::PartialJson(json!({
            "model": "claude-3-5-haiku-latest",
            "system": "Be brief.",
            "stream": true
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let config = fx.builtin(ProviderId::Anthropic);
    let (result, tokens) = run(&fx, &config, &ask("Hi")).await;

    assert_eq!(result.unwrap().output, "Sure, done.");
    assert_eq!(tokens, vec!["Sure", ", done."]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_azure_uses_deployment_path_and_api_key_header() {
    let mut fx = MockServerFixture::new().await;
    let mock = fx
        .server
        .mock("POST", "/openai/deployments/prod-4o/chat/completions")
        .match_query(Matcher::UrlEncoded("api-version".into(), "2024-06-01".into()))
        .match_header("api-key", TEST_KEY)
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_header("apim-request-id", "azure-req-7")
        .with_body(sse_body(&[openai_chunk("ok").as_str()], true))
        .create_async()
        .await;

    let config = UserConfig {
        model_name: "prod-4o".into(),
        azure_api_version: "2024-06-01".into(),
        ..fx.builtin(ProviderId::AzureOpenAi)
    };
    let (result, _) = run(&fx, &config, &ask("Hi")).await;
    let out = result.unwrap();

    assert_eq!(out.output, "ok");
    assert_eq!(out.stats.model, "prod-4o");
    assert_eq!(out.stats.upstream_request_id.as_deref(), Some("azure-req-7"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_custom_responses_endpoint_with_header_auth() {
    let mut fx = MockServerFixture::new().await;
    let body = sse_body(
        &[
            r#"{"type":"response.created","response":{"id":"resp_1"}}"#,
            r#"{"type":"response.output_text.delta","delta":"Good "}"#,
            r#"{"type":"response.output_text.delta","delta":"morning"}"#,
            r#"{"type":"response.output_text.done","text":"Good morning!"}"#,
            r#"{"type":"response.completed"}"#,
        ],
        false,
    );
    let mock = fx
        .server
        .mock("POST", "/v1/responses")
        .match_header("x-team", "voice")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::PartialJson(json!({
            "model": "house-model",
            "stream": true
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let config = UserConfig {
        custom_headers: r#"{"X-Team": "voice"}"#.into(),
        ..fx.custom("/v1/responses", AuthMode::Headers)
    };
    let (result, tokens) = run(&fx, &config, &ask("Hi")).await;
    let out = result.unwrap();

    assert_eq!(out.output, "Good morning!");
    assert_eq!(tokens, vec!["Good ", "morning", "!"]);
    assert_eq!(out.stats.provider_id, "house-proxy");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_keyless_local_server_sends_no_authorization() {
    let mut fx = MockServerFixture::new().await;
    let mock = fx
        .server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&[openai_chunk("local").as_str()], true))
        .create_async()
        .await;

    let config = UserConfig {
        api_key_input: String::new(),
        ..fx.builtin(ProviderId::Ollama)
    };
    let (result, _) = run(&fx, &config, &ask("Hi")).await;

    assert_eq!(result.unwrap().output, "local");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_errors_are_retried_until_exhausted() {
    let mut fx = MockServerFixture::new().await;
    let mock = fx
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .with_header("x-request-id", "req_503")
        .with_body(r#"{"error":{"message":"overloaded"}}"#)
        .expect(3)
        .create_async()
        .await;

    let config = UserConfig {
        max_retries: 2,
        ..fx.builtin(ProviderId::OpenAi)
    };
    let (result, tokens) = run(&fx, &config, &ask("Hi")).await;
    let err = result.unwrap_err();

    assert!(tokens.is_empty());
    assert_eq!(err.status_code(), Some(503));
    match &err {
        Error::ProviderFailure { request_id, body, .. } => {
            assert_eq!(request_id.as_deref(), Some("req_503"));
            assert!(body.contains("overloaded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.user_message(false).contains("overloaded"));
    assert!(err.user_message(true).contains("overloaded"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after_hint() {
    let mut fx = MockServerFixture::new().await;
    let mock = fx
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(429)
        .with_header("retry-after", "0")
        .with_body("slow down")
        .expect(2)
        .create_async()
        .await;

    let config = UserConfig {
        max_retries: 1,
        ..fx.builtin(ProviderId::OpenAi)
    };
    let (result, _) = run(&fx, &config, &ask("Hi")).await;
    let err = result.unwrap_err();

    assert_eq!(err.status_code(), Some(429));
    assert_eq!(err.retry_after_ms(), Some(0));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mut fx = MockServerFixture::new().await;
    let mock = fx
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":{"message":"bad key"}}"#)
        .expect(1)
        .create_async()
        .await;

    let config = UserConfig {
        max_retries: 5,
        ..fx.builtin(ProviderId::OpenAi)
    };
    let (result, _) = run(&fx, &config, &ask("Hi")).await;

    assert_eq!(result.unwrap_err().status_code(), Some(401));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_in_stream_vendor_error_fails_the_call() {
    let mut fx = MockServerFixture::new().await;
    let _mock = fx
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(
            &[
                openai_chunk("partial").as_str(),
                r#"{"error":{"message":"context length exceeded"}}"#,
            ],
            true,
        ))
        .create_async()
        .await;

    let config = fx.builtin(ProviderId::OpenAi);
    let (result, tokens) = run(&fx, &config, &ask("Hi")).await;
    let err = result.unwrap_err();

    assert_eq!(tokens, vec!["partial"]);
    match err {
        Error::ProviderFailure { status, body, .. } => {
            assert_eq!(status, 200);
            assert!(body.contains("context length exceeded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_blank_stream_is_empty_response() {
    let mut fx = MockServerFixture::new().await;
    let _mock = fx
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&[openai_chunk("  ").as_str()], true))
        .create_async()
        .await;

    let config = fx.builtin(ProviderId::DeepSeek);
    let (result, _) = run(&fx, &config, &ask("Hi")).await;

    assert!(matches!(result.unwrap_err(), Error::EmptyLlmResponse));
}

#[tokio::test]
async fn test_streaming_disabled_delivers_final_output_once() {
    let mut fx = MockServerFixture::new().await;
    let _mock = fx
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(
            &[openai_chunk(" Hello").as_str(), openai_chunk(" world ").as_str()],
            true,
        ))
        .create_async()
        .await;

    let config = UserConfig {
        streaming_enabled: false,
        ..fx.builtin(ProviderId::OpenAi)
    };
    let (result, tokens) = run(&fx, &config, &ask("Hi")).await;

    assert_eq!(result.unwrap().output, "Hello world");
    assert_eq!(tokens, vec!["Hello world"]);
}

#[tokio::test]
async fn test_cancelled_before_start_sends_nothing() {
    let mut fx = MockServerFixture::new().await;
    let mock = fx
        .server
        .mock("POST", "/v1/chat/completions")
        .expect(0)
        .create_async()
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let config = fx.builtin(ProviderId::OpenAi);
    let result = fx
        .gateway
        .stream_generate(&config, &ask("Hi"), |_| {}, &cancel)
        .await;

    assert!(matches!(result.unwrap_err(), Error::Cancelled));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_key_fails_before_network() {
    let mut fx = MockServerFixture::new().await;
    let mock = fx
        .server
        .mock("POST", "/v1/chat/completions")
        .expect(0)
        .create_async()
        .await;

    let config = UserConfig {
        api_key_input: "   ".into(),
        ..fx.builtin(ProviderId::OpenAi)
    };
    let (result, _) = run(&fx, &config, &ask("Hi")).await;
    let err = result.unwrap_err();

    assert!(matches!(err, Error::MissingApiKey { .. }));
    assert_eq!(err.user_message(false), "OpenAI API key is missing.");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_transcription_providers_cannot_generate() {
    let fx = MockServerFixture::new().await;
    let config = fx.builtin(ProviderId::Deepgram);
    let (result, _) = run(&fx, &config, &ask("Hi")).await;
    assert!(matches!(result.unwrap_err(), Error::UnsupportedEngine { .. }));
}

#[tokio::test]
async fn test_calls_through_one_gate_all_finish_and_release_permits() {
    let mut fx = MockServerFixture::new().await;
    let mock = fx
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&[openai_chunk("ok").as_str()], true))
        .expect(3)
        .create_async()
        .await;

    let config = UserConfig {
        max_in_flight: 1,
        ..fx.builtin(ProviderId::OpenAi)
    };
    let request = ask("Hi");
    let outputs = Arc::new(Mutex::new(Vec::new()));

    let calls = (0..3).map(|_| {
        let outputs = outputs.clone();
        let gateway = fx.gateway.clone();
        let config = config.clone();
        let request = request.clone();
        async move {
            let out = gateway
                .stream_generate(&config, &request, |_| {}, &CancellationToken::new())
                .await
                .unwrap();
            outputs.lock().unwrap().push(out.output);
        }
    });
    futures::future::join_all(calls).await;

    assert_eq!(outputs.lock().unwrap().len(), 3);
    let signals = fx.gateway.signals();
    let gate = signals.for_provider("openai").unwrap();
    assert_eq!(gate.max, 1);
    assert_eq!(gate.in_use, 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_sampling_settings_come_from_config() {
    let mut fx = MockServerFixture::new().await;
    let mock = fx
        .server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({
            "temperature": 0.2,
            "top_p": 1.0,
            "max_tokens": 300
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&[openai_chunk("ok").as_str()], true))
        .expect(1)
        .create_async()
        .await;

    let config = UserConfig {
        temperature: f64::NAN,
        top_p: 7.0,
        max_tokens: 300,
        ..fx.builtin(ProviderId::OpenAi)
    };
    let request = UnifiedRequest::builder()
        .message(Message::user("Hi"))
        .temperature(1.9)
        .max_tokens(8000)
        .build();
    let (result, _) = run(&fx, &config, &request).await;

    assert_eq!(result.unwrap().output, "ok");
    mock.assert_async().await;
}
