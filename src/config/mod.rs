//! 用户配置快照：每次调用注入的不可变配置
//!
//! User configuration snapshot. The application owns and persists its settings;
//! the gateway receives an immutable copy per call and never writes it back.
//!
//! Numeric limits are stored raw (whatever the settings store holds) and clamped
//! when a [`RuntimeConfig`](crate::runtime::RuntimeConfig) is resolved.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::registry::ProviderId;
use crate::{Error, ErrorContext, Result};

pub const TIMEOUT_SECONDS_RANGE: (i64, i64) = (15, 3600);
pub const MAX_RETRIES_RANGE: (i64, i64) = (0, 8);
pub const MAX_IN_FLIGHT_RANGE: (i64, i64) = (1, 8);

/// Which engine the user selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderSelection {
    /// A provider from the built-in registry.
    Builtin { provider: ProviderId },
    /// A user-defined OpenAI-compatible endpoint.
    Custom {
        id: String,
        name: String,
        /// Free-form secret-store reference for the API key.
        #[serde(default)]
        secret_ref: String,
    },
    /// An on-device engine; never served by the gateway.
    Local { engine: String },
}

impl ProviderSelection {
    pub fn builtin(provider: ProviderId) -> Self {
        ProviderSelection::Builtin { provider }
    }

    pub fn label(&self) -> String {
        match self {
            ProviderSelection::Builtin { provider } => {
                provider.descriptor().display_name.to_string()
            }
            ProviderSelection::Custom { id, name, .. } => {
                if name.trim().is_empty() {
                    id.clone()
                } else {
                    name.clone()
                }
            }
            ProviderSelection::Local { engine } => engine.clone(),
        }
    }
}

impl Default for ProviderSelection {
    fn default() -> Self {
        ProviderSelection::Builtin {
            provider: ProviderId::OpenAi,
        }
    }
}

/// How a custom provider authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// `Authorization: Bearer <key>`
    #[default]
    Bearer,
    /// Arbitrary headers from `custom_headers`; no key injected.
    Headers,
    /// No authentication.
    None,
}

/// Composed configuration snapshot for one gateway call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub provider: ProviderSelection,
    /// Overrides the registry default when non-empty.
    pub base_url: String,
    /// Overrides the registry default when non-empty. Azure deployment name.
    pub model_name: String,
    /// Key typed into the settings form but not yet saved.
    pub api_key_input: String,
    pub auth_mode: AuthMode,
    /// Custom providers only; JSON object of header name to value.
    pub custom_headers: String,
    /// Custom providers only; defaults to `/v1/chat/completions`.
    pub request_path: String,
    pub azure_api_version: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: i64,
    pub timeout_seconds: i64,
    pub max_retries: i64,
    pub max_in_flight: i64,
    pub streaming_enabled: bool,
    pub output_language: String,
    /// Debug toggle: include raw provider bodies in user-facing errors.
    pub reveal_error_bodies: bool,
    pub privacy_mode: bool,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            provider: ProviderSelection::default(),
            base_url: String::new(),
            model_name: String::new(),
            api_key_input: String::new(),
            auth_mode: AuthMode::Bearer,
            custom_headers: String::new(),
            request_path: String::new(),
            azure_api_version: String::new(),
            temperature: 0.2,
            top_p: 1.0,
            max_tokens: 4096,
            timeout_seconds: 60,
            max_retries: 2,
            max_in_flight: 2,
            streaming_enabled: true,
            output_language: "Auto".to_string(),
            reveal_error_bodies: false,
            privacy_mode: false,
        }
    }
}

impl UserConfig {
    pub fn for_provider(provider: ProviderId) -> Self {
        Self {
            provider: ProviderSelection::builtin(provider),
            ..Self::default()
        }
    }

    /// Load a snapshot from a `.yaml`/`.yml` or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&raw).map_err(|e| {
                Error::configuration_with_context(
                    "invalid YAML configuration",
                    ErrorContext::new()
                        .with_field_path(path.display().to_string())
                        .with_details(e.to_string())
                        .with_source("config_loader"),
                )
            }),
            _ => Ok(serde_json::from_str(&raw)?),
        }
    }

    /// Whether error displays may include provider response bodies.
    pub fn reveals_error_bodies(&self) -> bool {
        self.reveal_error_bodies && !self.privacy_mode
    }

    pub fn clamped_timeout_seconds(&self) -> u64 {
        clamp_i64(self.timeout_seconds, TIMEOUT_SECONDS_RANGE) as u64
    }

    pub fn clamped_max_retries(&self) -> u32 {
        clamp_i64(self.max_retries, MAX_RETRIES_RANGE) as u32
    }

    pub fn clamped_max_in_flight(&self) -> usize {
        clamp_i64(self.max_in_flight, MAX_IN_FLIGHT_RANGE) as usize
    }

    /// Sampling temperature limited to 0.0..=2.0; NaN falls back to the default.
    pub fn clamped_temperature(&self) -> f64 {
        clamp_f64(self.temperature, 0.2, 0.0, 2.0)
    }

    pub fn clamped_top_p(&self) -> f64 {
        clamp_f64(self.top_p, 1.0, 0.0, 1.0)
    }

    pub fn clamped_max_tokens(&self) -> u32 {
        self.max_tokens.clamp(1, u32::MAX as i64) as u32
    }
}

fn clamp_i64(value: i64, (lower, upper): (i64, i64)) -> i64 {
    value.clamp(lower, upper)
}

fn clamp_f64(value: f64, fallback: f64, lower: f64, upper: f64) -> f64 {
    if value.is_nan() {
        return fallback;
    }
    value.clamp(lower, upper)
}
