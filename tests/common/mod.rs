//! Mock HTTP server setup for integration tests

#![allow(dead_code)]

use ghosttype_gateway::config::{AuthMode, ProviderSelection};
use ghosttype_gateway::credentials::MemorySecretStore;
use ghosttype_gateway::registry::ProviderId;
use ghosttype_gateway::{Gateway, UserConfig};
use mockito::{Server, ServerGuard};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_KEY: &str = "sk-test";

/// A mock vendor plus a gateway wired to reach it quickly.
pub struct MockServerFixture {
    pub server: ServerGuard,
    pub base_url: String,
    pub gateway: Gateway,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        Self::with_store(MemorySecretStore::new()).await
    }

    pub async fn with_store(store: MemorySecretStore) -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("test http client");
        let gateway = Gateway::builder()
            .secret_store(Arc::new(store))
            .http_client(client)
            .retry_delays(Duration::from_millis(1), Duration::from_millis(5))
            .build()
            .expect("gateway");
        Self {
            server,
            base_url,
            gateway,
        }
    }

    /// Built-in provider pointed at the mock server, with a typed key.
    pub fn builtin(&self, provider: ProviderId) -> UserConfig {
        UserConfig {
            base_url: self.base_url.clone(),
            api_key_input: TEST_KEY.to_string(),
            ..UserConfig::for_provider(provider)
        }
    }

    /// Custom OpenAI-compatible endpoint on the mock server.
    pub fn custom(&self, request_path: &str, auth_mode: AuthMode) -> UserConfig {
        UserConfig {
            provider: ProviderSelection::Custom {
                id: "house-proxy".into(),
                name: "House Proxy".into(),
                secret_ref: String::new(),
            },
            base_url: self.base_url.clone(),
            model_name: "house-model".into(),
            request_path: request_path.into(),
            auth_mode,
            api_key_input: TEST_KEY.to_string(),
            ..UserConfig::default()
        }
    }
}

/// Build an SSE body from JSON payloads, terminated with `[DONE]` when asked.
pub fn sse_body(events: &[&str], done: bool) -> String {
    let mut body: String = events
        .iter()
        .map(|event| {
            if event.starts_with("data:") || event.starts_with("event:") {
                format!("{}\n\n", event)
            } else {
                format!("data: {}\n\n", event)
            }
        })
        .collect();
    if done {
        body.push_str("data: [DONE]\n\n");
    }
    body
}

pub fn openai_chunk(text: &str) -> String {
    serde_json::json!({
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {"content": text}}]
    })
    .to_string()
}
