use crate::transport::TransportError;
use thiserror::Error;

/// Longest response body kept on a [`Error::ProviderFailure`].
pub const MAX_ERROR_BODY_BYTES: usize = 2048;

/// Structured error context for configuration problems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Configuration key that caused the error (e.g., "custom_headers", "base_url")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "runtime_config", "config_loader")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the gateway.
///
/// Configuration errors (`MissingApiKey`, `InvalidUrl`, `UnsupportedEngine`,
/// `Configuration`) are raised before any network I/O. `InvalidHttpResponse`
/// and `ProviderFailure` come out of the transport and may have been retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing API key for {provider}")]
    MissingApiKey { provider: String },

    #[error("Invalid URL: {raw:?}")]
    InvalidUrl { raw: String },

    #[error("Unsupported engine for cloud inference: {engine}")]
    UnsupportedEngine { engine: String },

    #[error("Invalid HTTP response: {0}")]
    InvalidHttpResponse(#[from] TransportError),

    #[error("Provider failure: HTTP {status}{}", format_request_id(.request_id))]
    ProviderFailure {
        status: u16,
        body: String,
        request_id: Option<String>,
        /// Server-requested delay before the next attempt (`Retry-After`).
        retry_after_ms: Option<u64>,
    },

    #[error("Provider returned an empty response")]
    EmptyLlmResponse,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_request_id(request_id: &Option<String>) -> String {
    match request_id {
        Some(id) => format!(" (request id: {})", id),
        None => String::new(),
    }
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn missing_api_key(provider: impl Into<String>) -> Self {
        Error::MissingApiKey {
            provider: provider.into(),
        }
    }

    pub fn invalid_url(raw: impl Into<String>) -> Self {
        Error::InvalidUrl { raw: raw.into() }
    }

    pub fn unsupported_engine(engine: impl Into<String>) -> Self {
        Error::UnsupportedEngine {
            engine: engine.into(),
        }
    }

    /// Build a provider failure, truncating the body to [`MAX_ERROR_BODY_BYTES`].
    pub fn provider_failure(status: u16, body: &str, request_id: Option<String>) -> Self {
        Error::ProviderFailure {
            status,
            body: truncate_body(body),
            request_id,
            retry_after_ms: None,
        }
    }

    /// Attach a `Retry-After` hint to a provider failure; other variants are unchanged.
    pub fn with_retry_after(mut self, hint_ms: Option<u64>) -> Self {
        if let Error::ProviderFailure { retry_after_ms, .. } = &mut self {
            *retry_after_ms = hint_ms;
        }
        self
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Error::ProviderFailure { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Configuration errors never reach the network.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MissingApiKey { .. }
                | Error::InvalidUrl { .. }
                | Error::UnsupportedEngine { .. }
                | Error::Configuration { .. }
        )
    }

    /// Whether the resilience wrapper may issue another attempt after this error.
    ///
    /// Transport failures, 408, 429 and 5xx are transient; every other 4xx is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::InvalidHttpResponse(_) => true,
            Error::ProviderFailure { status, .. } => {
                matches!(*status, 408 | 429) || (500..=599).contains(status)
            }
            _ => false,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::ProviderFailure { status, .. } => Some(*status),
            Error::InvalidHttpResponse(TransportError::Http(e)) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Short human-readable status line for display.
    ///
    /// Raw response bodies are only included when `reveal_body` is set.
    pub fn user_message(&self, reveal_body: bool) -> String {
        match self {
            Error::MissingApiKey { provider } => format!("{} API key is missing.", provider),
            Error::InvalidUrl { .. } => "The configured endpoint URL is invalid.".to_string(),
            Error::UnsupportedEngine { .. } => {
                "This engine runs on-device and cannot be used for cloud inference.".to_string()
            }
            Error::InvalidHttpResponse(TransportError::Timeout) => {
                "The provider did not respond in time.".to_string()
            }
            Error::InvalidHttpResponse(_) => "Could not reach the provider.".to_string(),
            Error::ProviderFailure {
                status,
                body,
                request_id,
                ..
            } => {
                let mut msg = format!("Provider error (HTTP {}).", status);
                if let Some(id) = request_id {
                    msg.push_str(&format!(" Request ID: {}.", id));
                }
                if reveal_body && !body.trim().is_empty() {
                    msg.push(' ');
                    msg.push_str(body.trim());
                }
                msg
            }
            Error::EmptyLlmResponse => "The provider returned no text.".to_string(),
            Error::Cancelled => "Cancelled.".to_string(),
            Error::Configuration { message, .. } => format!("Configuration error: {}", message),
            Error::Serialization(_) => "The provider sent malformed data.".to_string(),
            Error::Io(_) => "A local I/O error occurred.".to_string(),
        }
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_BYTES {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
