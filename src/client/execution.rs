//! 请求执行逻辑：单次连接并校验响应状态。
//!
//! Request execution logic (single attempt). Retries wrap this from the outside.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::drivers::HttpRequest;
use crate::transport::HttpTransport;
use crate::{BoxStream, Error, Result};

/// Response headers that carry a vendor request id, in preference order.
pub(crate) const REQUEST_ID_HEADERS: &[&str] = &[
    "x-request-id",
    "request-id",
    "apim-request-id",
    "x-goog-request-id",
    "cf-ray",
];

/// A validated 2xx response whose body has not been read yet.
pub(crate) struct OpenStream {
    pub body: BoxStream<'static, Bytes>,
    pub http_status: u16,
    pub upstream_request_id: Option<String>,
}

/// Extract the first non-empty header value from a list of header names.
pub(crate) fn header_first(headers: &HeaderMap, names: &[&str]) -> Option<String> {
    for name in names {
        if let Some(v) = headers.get(*name) {
            if let Ok(s) = v.to_str() {
                let s = s.trim();
                if !s.is_empty() {
                    return Some(s.to_string());
                }
            }
        }
    }
    None
}

/// Best-effort parsing of `Retry-After`. Only the `<seconds>` form is supported.
pub(crate) fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    let raw = header_first(headers, &["retry-after"])?;
    let secs: u64 = raw.parse().ok()?;
    Some(secs.saturating_mul(1000))
}

/// Send `request` and classify the response: 2xx opens a stream, anything else is a
/// `ProviderFailure`, no response at all is `InvalidHttpResponse`.
pub(crate) async fn connect_once(
    transport: &HttpTransport,
    request: &HttpRequest,
    timeout: Duration,
    privacy_mode: bool,
) -> Result<OpenStream> {
    let start = Instant::now();
    let resp = transport.send(request, timeout).await?;

    let status = resp.status();
    let upstream_request_id = header_first(resp.headers(), REQUEST_ID_HEADERS);

    if !status.is_success() {
        let retry_after = retry_after_ms(resp.headers());
        let body = resp.text().await.unwrap_or_default();
        info!(
            http_status = status.as_u16(),
            upstream_request_id = upstream_request_id.as_deref().unwrap_or(""),
            duration_ms = start.elapsed().as_millis() as u64,
            "provider request failed"
        );
        if !privacy_mode {
            debug!(body = body.as_str(), "provider error body");
        }
        return Err(
            Error::provider_failure(status.as_u16(), &body, upstream_request_id)
                .with_retry_after(retry_after),
        );
    }

    debug!(
        http_status = status.as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "provider stream opened"
    );

    Ok(OpenStream {
        body: HttpTransport::byte_stream(resp),
        http_status: status.as_u16(),
        upstream_request_id,
    })
}
