use crate::drivers::{HttpMethod, HttpRequest};
use crate::BoxStream;
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::Proxy;
use std::env;
use std::time::Duration;
use tracing::debug;

/// Shared `reqwest` client. Per-call limits (timeout, headers) travel with each request,
/// so one transport serves every provider.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        // Minimal production-friendly defaults (env-overridable).
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(
                env_u64("GHOSTTYPE_HTTP_CONNECT_TIMEOUT_SECS").unwrap_or(15),
            ))
            .pool_max_idle_per_host(
                env_u64("GHOSTTYPE_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .map(|n| n as usize)
                    .unwrap_or(8),
            )
            .pool_idle_timeout(Some(Duration::from_secs(
                env_u64("GHOSTTYPE_HTTP_POOL_IDLE_TIMEOUT_SECS").unwrap_or(90),
            )))
            // Long-lived SSE connections.
            .http2_adaptive_window(true)
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10));

        if let Ok(proxy_url) = env::var("GHOSTTYPE_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an existing client (custom TLS roots, test harnesses).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Issue one request and return the response as soon as headers arrive.
    ///
    /// `timeout` bounds the whole exchange, including reading a streamed body.
    pub async fn send(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<reqwest::Response, TransportError> {
        let mut req = match request.method {
            HttpMethod::Post => self.client.post(request.url.clone()),
            HttpMethod::Get => self.client.get(request.url.clone()),
        };

        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            req = req.json(body);
        }

        debug!(
            method = request.method.as_str(),
            host = request.url.host_str().unwrap_or(""),
            path = request.url.path(),
            "sending provider request"
        );

        req.timeout(timeout)
            .send()
            .await
            .map_err(TransportError::from_reqwest)
    }

    /// Convert a successful response into the unified byte stream consumed by the pipeline.
    pub fn byte_stream(resp: reqwest::Response) -> BoxStream<'static, Bytes> {
        Box::pin(
            resp.bytes_stream()
                .map_err(|e| crate::Error::InvalidHttpResponse(TransportError::from_reqwest(e))),
        )
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|s| s.trim().parse::<u64>().ok())
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Http(e)
        }
    }
}
