//! 运行时配置：将用户配置快照解析为单次调用的连接描述
//!
//! Runtime configuration. [`RuntimeConfig::resolve`] turns the provider selection
//! and the user's settings into a fully resolved connection descriptor: base URL,
//! model, dialect, auth headers, query items and clamped limits. It is built
//! fresh for every call and never mutated afterwards.
//!
//! Everything here runs before network I/O, so every failure is a configuration
//! error (`MissingApiKey`, `InvalidUrl`, `UnsupportedEngine`, `Configuration`).

use reqwest::header::{HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{AuthMode, ProviderSelection, UserConfig};
use crate::credentials::CredentialResolver;
use crate::drivers::{ParserKind, RequestKind};
use crate::registry::{
    AuthStyle, Capability, ProviderDescriptor, ProviderId, AZURE_DEFAULT_API_VERSION,
    OPENAI_CHAT_PATH,
};
use crate::types::UnifiedRequest;
use crate::{Error, ErrorContext, Result};

/// Fully resolved provider connection for one call.
#[derive(Clone, PartialEq)]
pub struct RuntimeConfig {
    pub provider_id: String,
    pub provider_name: String,
    /// Absolute http(s) URL without a trailing slash.
    pub base_url: String,
    pub model_name: String,
    /// Empty for providers that need no authentication.
    pub api_key: String,
    /// Path template; may contain `{model}` or `{deployment}`.
    pub request_path: String,
    pub request_kind: RequestKind,
    pub parser_kind: ParserKind,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub max_in_flight: usize,
    pub streaming_enabled: bool,
    pub extra_headers: Vec<(String, String)>,
    pub query_items: Vec<(String, String)>,
    pub output_language: String,
    /// Sampling settings; these replace the request's own values on the wire.
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    /// Keep request and response bodies out of logs.
    pub privacy_mode: bool,
    pub reveal_error_bodies: bool,
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("provider_id", &self.provider_id)
            .field("base_url", &self.base_url)
            .field("model_name", &self.model_name)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "<redacted>" })
            .field("request_path", &self.request_path)
            .field("request_kind", &self.request_kind)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .field("max_in_flight", &self.max_in_flight)
            .field("streaming_enabled", &self.streaming_enabled)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_tokens", &self.max_tokens)
            .field("privacy_mode", &self.privacy_mode)
            .finish_non_exhaustive()
    }
}

impl RuntimeConfig {
    /// Resolve credentials and build the descriptor for a generation call.
    pub async fn resolve(config: &UserConfig, credentials: &CredentialResolver) -> Result<Self> {
        ensure_generation(&config.provider)?;
        let api_key = credentials.resolve_for(config).await?;
        let runtime = Self::assemble(config, api_key)?;
        debug!(
            provider = runtime.provider_id.as_str(),
            model = runtime.model_name.as_str(),
            kind = ?runtime.request_kind,
            "resolved runtime config"
        );
        Ok(runtime)
    }

    /// Build the descriptor from an already-resolved key.
    pub fn assemble(config: &UserConfig, api_key: String) -> Result<Self> {
        ensure_generation(&config.provider)?;

        let mut runtime = match &config.provider {
            ProviderSelection::Builtin { provider } => builtin(config, *provider, &api_key)?,
            ProviderSelection::Custom { id, .. } => custom(config, id, &api_key)?,
            ProviderSelection::Local { engine } => return Err(Error::unsupported_engine(engine)),
        };
        runtime.api_key = api_key;
        Ok(runtime)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// `request` with the configured sampling settings in place of its own.
    pub fn sampled(&self, request: &UnifiedRequest) -> UnifiedRequest {
        let mut request = request.clone();
        request.params.temperature = self.temperature;
        request.params.top_p = self.top_p;
        request.params.max_tokens = self.max_tokens;
        request
    }

    /// Admission gate key: gates are shared per provider and concurrency limit.
    pub fn admission_key(&self) -> (String, usize) {
        (self.provider_id.clone(), self.max_in_flight)
    }
}

fn ensure_generation(selection: &ProviderSelection) -> Result<()> {
    match selection {
        ProviderSelection::Local { engine } => Err(Error::unsupported_engine(engine)),
        ProviderSelection::Builtin { provider } => match provider.descriptor().capability {
            Capability::Generation(_) => Ok(()),
            Capability::Transcription => Err(Error::unsupported_engine(provider.id())),
        },
        ProviderSelection::Custom { .. } => Ok(()),
    }
}

fn builtin(config: &UserConfig, provider: ProviderId, api_key: &str) -> Result<RuntimeConfig> {
    let descriptor = provider.descriptor();
    let request_kind = descriptor
        .request_kind()
        .ok_or_else(|| Error::unsupported_engine(descriptor.id))?;

    let base_url = base_url_for(config, Some(descriptor))?;
    let model_name = non_empty(&config.model_name).unwrap_or(descriptor.default_model);
    if model_name.is_empty() {
        return Err(Error::configuration_with_context(
            format!("{} needs a model or deployment name", descriptor.display_name),
            ErrorContext::new()
                .with_field_path("model_name")
                .with_source("runtime_config"),
        ));
    }

    let mut extra_headers = auth_headers(descriptor.auth, api_key);
    extra_headers.extend(
        descriptor
            .static_headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    );

    let mut query_items: Vec<(String, String)> = descriptor
        .static_query
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    if request_kind == RequestKind::AzureOpenAiChat {
        let version = non_empty(&config.azure_api_version).unwrap_or(AZURE_DEFAULT_API_VERSION);
        query_items.push(("api-version".to_string(), version.to_string()));
    }

    Ok(RuntimeConfig {
        provider_id: descriptor.id.to_string(),
        provider_name: descriptor.display_name.to_string(),
        base_url,
        model_name: model_name.to_string(),
        api_key: String::new(),
        request_path: descriptor.request_path.to_string(),
        request_kind,
        parser_kind: request_kind.parser_kind(),
        timeout_seconds: config.clamped_timeout_seconds(),
        max_retries: config.clamped_max_retries(),
        max_in_flight: config.clamped_max_in_flight(),
        streaming_enabled: config.streaming_enabled,
        extra_headers,
        query_items,
        output_language: config.output_language.clone(),
        temperature: config.clamped_temperature(),
        top_p: config.clamped_top_p(),
        max_tokens: config.clamped_max_tokens(),
        privacy_mode: config.privacy_mode,
        reveal_error_bodies: config.reveals_error_bodies(),
    })
}

fn custom(config: &UserConfig, id: &str, api_key: &str) -> Result<RuntimeConfig> {
    let base_url = base_url_for(config, None)?;
    let request_path = non_empty(&config.request_path)
        .unwrap_or(OPENAI_CHAT_PATH)
        .to_string();
    let request_kind = custom_request_kind(&request_path);

    Ok(RuntimeConfig {
        provider_id: id.to_string(),
        provider_name: config.provider.label(),
        base_url,
        model_name: config.model_name.trim().to_string(),
        api_key: String::new(),
        request_path,
        request_kind,
        parser_kind: request_kind.parser_kind(),
        timeout_seconds: config.clamped_timeout_seconds(),
        max_retries: config.clamped_max_retries(),
        max_in_flight: config.clamped_max_in_flight(),
        streaming_enabled: config.streaming_enabled,
        extra_headers: custom_auth_headers(config, api_key)?,
        query_items: Vec::new(),
        output_language: config.output_language.clone(),
        temperature: config.clamped_temperature(),
        top_p: config.clamped_top_p(),
        max_tokens: config.clamped_max_tokens(),
        privacy_mode: config.privacy_mode,
        reveal_error_bodies: config.reveals_error_bodies(),
    })
}

/// Custom endpoints speak the Responses dialect when their path says so.
pub fn custom_request_kind(request_path: &str) -> RequestKind {
    let path = request_path.trim().trim_end_matches('/');
    let path = path.split('?').next().unwrap_or(path);
    if path.ends_with("/responses") {
        RequestKind::OpenAiResponses
    } else {
        RequestKind::OpenAiChat
    }
}

/// Configured base URL, else the registry default; validated and without a trailing slash.
pub(crate) fn base_url_for(
    config: &UserConfig,
    descriptor: Option<&ProviderDescriptor>,
) -> Result<String> {
    let raw = non_empty(&config.base_url)
        .or_else(|| descriptor.and_then(|d| d.default_base_url))
        .unwrap_or("");
    validate_base_url(raw)
}

pub(crate) fn validate_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::invalid_url(raw.trim()));
    }
    match Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
            Ok(trimmed.to_string())
        }
        _ => Err(Error::invalid_url(raw.trim())),
    }
}

/// Headers carrying `api_key` for a registry auth style. An empty key sends nothing.
pub(crate) fn auth_headers(style: AuthStyle, api_key: &str) -> Vec<(String, String)> {
    if api_key.is_empty() {
        return Vec::new();
    }
    match style {
        AuthStyle::Bearer => vec![("Authorization".to_string(), format!("Bearer {}", api_key))],
        AuthStyle::Token => vec![("Authorization".to_string(), format!("Token {}", api_key))],
        AuthStyle::Header(name) => vec![(name.to_string(), api_key.to_string())],
        AuthStyle::None => Vec::new(),
    }
}

/// Auth headers for a custom endpoint according to its auth mode.
pub(crate) fn custom_auth_headers(
    config: &UserConfig,
    api_key: &str,
) -> Result<Vec<(String, String)>> {
    match config.auth_mode {
        AuthMode::Bearer => Ok(auth_headers(AuthStyle::Bearer, api_key)),
        AuthMode::Headers => parse_custom_headers(&config.custom_headers),
        AuthMode::None => Ok(Vec::new()),
    }
}

/// Parse the `{"Header": "value"}` JSON object typed into the settings form.
pub fn parse_custom_headers(raw: &str) -> Result<Vec<(String, String)>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let invalid = |details: String| {
        Error::configuration_with_context(
            "custom headers must be a JSON object of strings",
            ErrorContext::new()
                .with_field_path("custom_headers")
                .with_details(details)
                .with_source("runtime_config"),
        )
    };

    let value: Value = serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(invalid("expected a JSON object".to_string()));
    };

    let mut headers = Vec::with_capacity(map.len());
    for (name, value) in map {
        let Value::String(value) = value else {
            return Err(invalid(format!("value for {:?} is not a string", name)));
        };
        HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| invalid(format!("invalid header name {:?}", name)))?;
        HeaderValue::from_str(&value)
            .map_err(|_| invalid(format!("invalid value for header {:?}", name)))?;
        headers.push((name.trim().to_string(), value));
    }
    Ok(headers)
}

fn non_empty(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
