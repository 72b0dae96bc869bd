//! 模型发现：各方言的 "list models" 探测
//!
//! Model discovery. A one-shot, non-streaming GET against the provider's model
//! listing endpoint, using the same base URL and credential rules as
//! generation. No retries: the settings form shows the failure and the user
//! tries again.

use serde_json::Value;
use tracing::{debug, info};

use crate::config::{ProviderSelection, UserConfig};
use crate::drivers::{compose_url, HttpMethod, HttpRequest};
use crate::registry::{ProviderId, AZURE_DEFAULT_API_VERSION};
use crate::runtime::{auth_headers, base_url_for, custom_auth_headers};
use crate::{Error, Result};

use super::core::Gateway;
use super::execution::{header_first, REQUEST_ID_HEADERS};

/// How a listing response is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelListShape {
    /// `{"data": [{"id": ...}]}` (OpenAI-compatible, Azure, Anthropic)
    DataIds,
    /// `{"models": [{"name": "models/..."}]}`
    Gemini,
    /// `{"stt": [{"canonical_name": ...}]}`
    Deepgram,
}

/// What discovery will do for a configuration.
#[derive(Debug, Clone)]
pub enum ModelsProbe {
    /// The provider has no listing endpoint; these are its known models.
    Static(Vec<String>),
    Http {
        request: HttpRequest,
        shape: ModelListShape,
    },
}

impl Gateway {
    /// List model identifiers the configured provider offers.
    pub async fn discover_models(&self, config: &UserConfig) -> Result<Vec<String>> {
        if let Some(models) = static_models(&config.provider)? {
            return Ok(models);
        }

        let api_key = self.inner.credentials.resolve_for(config).await?;
        let (request, shape) = match models_probe(config, &api_key)? {
            ModelsProbe::Static(models) => return Ok(models),
            ModelsProbe::Http { request, shape } => (request, shape),
        };

        let resp = self
            .inner
            .transport
            .send(&request, std::time::Duration::from_secs(config.clamped_timeout_seconds()))
            .await?;
        let status = resp.status().as_u16();
        let request_id = header_first(resp.headers(), REQUEST_ID_HEADERS);
        let body = resp.text().await.unwrap_or_default();

        if !(200..300).contains(&status) {
            info!(
                provider = config.provider.label().as_str(),
                http_status = status,
                "model discovery failed"
            );
            return Err(Error::provider_failure(status, &body, request_id));
        }

        let json: Value = serde_json::from_str(&body)?;
        let models = parse_model_list(shape, &json);
        debug!(
            provider = config.provider.label().as_str(),
            count = models.len(),
            "discovered models"
        );
        Ok(models)
    }
}

/// Providers whose catalogue is fixed (or not discoverable at all).
fn static_models(selection: &ProviderSelection) -> Result<Option<Vec<String>>> {
    match selection {
        ProviderSelection::Local { engine } => Err(Error::unsupported_engine(engine)),
        ProviderSelection::Builtin { provider } => {
            let d = provider.descriptor();
            Ok(d.models_path
                .is_none()
                .then(|| d.known_models.iter().map(|m| m.to_string()).collect()))
        }
        ProviderSelection::Custom { .. } => Ok(None),
    }
}

/// Build the listing request for `config` with an already resolved key.
pub fn models_probe(config: &UserConfig, api_key: &str) -> Result<ModelsProbe> {
    let (base_url, path, mut headers, query, shape) = match &config.provider {
        ProviderSelection::Local { engine } => return Err(Error::unsupported_engine(engine)),
        ProviderSelection::Builtin { provider } => {
            let d = provider.descriptor();
            let Some(path) = d.models_path else {
                return Ok(ModelsProbe::Static(
                    d.known_models.iter().map(|m| m.to_string()).collect(),
                ));
            };
            let mut headers = auth_headers(d.auth, api_key);
            headers.extend(
                d.static_headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string())),
            );
            let mut query = Vec::new();
            let shape = match provider {
                ProviderId::AzureOpenAi => {
                    let version = config.azure_api_version.trim();
                    let version = if version.is_empty() {
                        AZURE_DEFAULT_API_VERSION
                    } else {
                        version
                    };
                    query.push(("api-version".to_string(), version.to_string()));
                    ModelListShape::DataIds
                }
                ProviderId::Gemini => ModelListShape::Gemini,
                ProviderId::Deepgram => ModelListShape::Deepgram,
                _ => ModelListShape::DataIds,
            };
            (base_url_for(config, Some(d))?, path.to_string(), headers, query, shape)
        }
        ProviderSelection::Custom { .. } => (
            base_url_for(config, None)?,
            custom_models_path(&config.request_path),
            custom_auth_headers(config, api_key)?,
            Vec::new(),
            ModelListShape::DataIds,
        ),
    };

    let url = compose_url(&base_url, &path, "", &query)?;
    headers.push(("accept".to_string(), "application/json".to_string()));
    Ok(ModelsProbe::Http {
        request: HttpRequest {
            method: HttpMethod::Get,
            url,
            headers,
            body: None,
        },
        shape,
    })
}

/// `/v1/chat/completions` -> `/v1/models`; `/api/v2/responses` -> `/api/v2/models`.
pub fn custom_models_path(request_path: &str) -> String {
    let path = request_path.trim().trim_end_matches('/');
    for suffix in ["/chat/completions", "/responses", "/completions"] {
        if let Some(prefix) = path.strip_suffix(suffix) {
            return format!("{}/models", prefix);
        }
    }
    "/v1/models".to_string()
}

/// Extract model ids from a listing response. Duplicates are dropped, order kept.
pub fn parse_model_list(shape: ModelListShape, json: &Value) -> Vec<String> {
    let (array, field) = match shape {
        ModelListShape::DataIds => ("data", "id"),
        ModelListShape::Gemini => ("models", "name"),
        ModelListShape::Deepgram => ("stt", "canonical_name"),
    };

    let mut out: Vec<String> = Vec::new();
    let items = json
        .get(array)
        .and_then(|v| v.as_array())
        .map(|a| a.as_slice())
        .unwrap_or(&[]);
    for item in items {
        let Some(raw) = item.get(field).and_then(|v| v.as_str()) else {
            continue;
        };
        let id = match shape {
            ModelListShape::Gemini => raw.strip_prefix("models/").unwrap_or(raw),
            _ => raw,
        };
        if !id.is_empty() && !out.iter().any(|m| m == id) {
            out.push(id.to_string());
        }
    }
    out
}
