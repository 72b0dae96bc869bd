//! 方言驱动：按方言构建请求体并解析流式事件
//!
//! Dialect drivers. Each dialect is a pair of pure functions: one that turns a
//! [`UnifiedRequest`] into the vendor JSON body, one that extracts text from a
//! single SSE payload. Dispatch is by [`RequestKind`] / [`ParserKind`], never by
//! provider, so OpenAI, DeepSeek, Groq, Ollama, LM Studio and custom endpoints
//! all share the OpenAI code paths.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::runtime::RuntimeConfig;
use crate::types::UnifiedRequest;
use crate::{Error, Result};

/// Request body dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    OpenAiChat,
    OpenAiResponses,
    AzureOpenAiChat,
    Anthropic,
    Gemini,
}

impl RequestKind {
    /// Stream parser matching this request dialect. Azure streams OpenAI chat chunks.
    pub fn parser_kind(&self) -> ParserKind {
        match self {
            RequestKind::OpenAiChat | RequestKind::AzureOpenAiChat => ParserKind::OpenAiChat,
            RequestKind::OpenAiResponses => ParserKind::OpenAiResponses,
            RequestKind::Anthropic => ParserKind::Anthropic,
            RequestKind::Gemini => ParserKind::Gemini,
        }
    }
}

/// Stream event dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    OpenAiChat,
    OpenAiResponses,
    Anthropic,
    Gemini,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Fully built HTTP request, ready for the transport.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    /// Ordered; names are unique ignoring ASCII case.
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any existing value with the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }
}

/// Parser-side accumulator carried from one stream event to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseCursor {
    /// Text produced so far for the current output item.
    pub emitted: String,
    /// `(output_index, content_index)` of that item; `None` for single-item dialects.
    pub item: Option<(u64, u64)>,
}

impl ParseCursor {
    /// Cursor after `text` was produced for the same item.
    pub fn advanced(&self, text: &str) -> Self {
        Self {
            emitted: format!("{}{}", self.emitted, text),
            item: self.item,
        }
    }

    /// Text already produced for `item`; empty once a different item starts.
    pub fn emitted_for(&self, item: (u64, u64)) -> &str {
        if self.item == Some(item) {
            &self.emitted
        } else {
            ""
        }
    }
}

/// Text extracted from one stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFragment {
    pub text: String,
    pub cursor: ParseCursor,
}

/// Outcome of parsing one stream payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    Fragment(ParsedFragment),
    /// Metadata-only event (role announcements, usage, pings).
    Skip,
    /// Vendor reported an error inside an otherwise successful stream.
    VendorError(Value),
}

/// Wire `max_tokens`: `clamp(max(2048, 2 × input chars), 1, configured)`.
pub fn dynamic_max_tokens(request: &UnifiedRequest) -> u32 {
    let configured = request.params.max_tokens.max(1) as u64;
    let wanted = (2 * request.input_char_count() as u64).max(2048);
    wanted.clamp(1, configured) as u32
}

/// Serialize `request` for `runtime`'s dialect, with `runtime`'s sampling settings.
pub fn build_request(runtime: &RuntimeConfig, request: &UnifiedRequest) -> Result<HttpRequest> {
    let url = compose_url(
        &runtime.base_url,
        &runtime.request_path,
        &runtime.model_name,
        &runtime.query_items,
    )?;

    let sampled = runtime.sampled(request);
    let request = &sampled;
    let max_tokens = dynamic_max_tokens(request);
    let body = match runtime.request_kind {
        RequestKind::OpenAiChat => openai::chat_body(request, &runtime.model_name, max_tokens),
        // The deployment in the path selects the model; the body carries no model field.
        RequestKind::AzureOpenAiChat => openai::azure_chat_body(request, max_tokens),
        RequestKind::OpenAiResponses => {
            openai::responses_body(request, &runtime.model_name, max_tokens)
        }
        RequestKind::Anthropic => anthropic::messages_body(request, &runtime.model_name, max_tokens),
        RequestKind::Gemini => gemini::generate_body(request, max_tokens),
    };

    let mut http = HttpRequest {
        method: HttpMethod::Post,
        url,
        headers: Vec::new(),
        body: Some(body),
    };
    http.set_header("content-type", "application/json");
    http.set_header("accept", "text/event-stream");
    http.set_header("x-client-request-id", request.request_id.clone());
    for (name, value) in &runtime.extra_headers {
        http.set_header(name.clone(), value.clone());
    }
    Ok(http)
}

/// Parse one SSE `data:` payload (already known not to be `[DONE]`).
pub fn parse_event(
    kind: ParserKind,
    payload: &str,
    cursor: &ParseCursor,
) -> std::result::Result<ParsedEvent, serde_json::Error> {
    let v: Value = serde_json::from_str(payload)?;
    Ok(match kind {
        ParserKind::OpenAiChat => openai::parse_chat_event(&v, cursor),
        ParserKind::OpenAiResponses => openai::parse_responses_event(&v, cursor),
        ParserKind::Anthropic => anthropic::parse_event(&v, cursor),
        ParserKind::Gemini => gemini::parse_event(&v, cursor),
    })
}

/// Join base URL and path template, substitute `{model}`/`{deployment}`, append query items.
pub fn compose_url(
    base_url: &str,
    path_template: &str,
    model: &str,
    query_items: &[(String, String)],
) -> Result<Url> {
    let base = base_url.trim().trim_end_matches('/');
    let encoded_model = encode_path_segment(model);
    let path = path_template
        .trim()
        .replace("{model}", &encoded_model)
        .replace("{deployment}", &encoded_model);
    let raw = if path.is_empty() || path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    };

    let mut url = Url::parse(&raw).map_err(|_| Error::invalid_url(raw.clone()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::invalid_url(raw));
    }

    if !query_items.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in query_items {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub(crate) fn encode_path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Shared OpenAI-style handling of `tools` / `tool_choice`.
pub(crate) fn apply_tools(body: &mut Value, request: &UnifiedRequest) {
    if request.tools.is_empty() {
        return;
    }
    body["tools"] = Value::Array(request.tools.clone());
    if let Some(choice) = &request.tool_choice {
        body["tool_choice"] = choice.clone();
    }
}
