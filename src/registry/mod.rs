//! 厂商注册表：将 provider 标识映射到方言、默认端点与鉴权方式
//!
//! Provider registry. Maps a built-in provider identity to a static descriptor
//! (dialect, default endpoint, auth style, secret key) so that per-provider
//! branching lives in one table instead of being repeated in every layer.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::drivers::RequestKind;

/// Built-in provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openai_responses")]
    OpenAiResponses,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "groq")]
    Groq,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "lm_studio")]
    LmStudio,
    #[serde(rename = "deepgram")]
    Deepgram,
    #[serde(rename = "assemblyai")]
    AssemblyAi,
}

impl ProviderId {
    pub const ALL: [ProviderId; 11] = [
        ProviderId::OpenAi,
        ProviderId::OpenAiResponses,
        ProviderId::AzureOpenAi,
        ProviderId::Anthropic,
        ProviderId::Gemini,
        ProviderId::Groq,
        ProviderId::DeepSeek,
        ProviderId::Ollama,
        ProviderId::LmStudio,
        ProviderId::Deepgram,
        ProviderId::AssemblyAi,
    ];

    pub fn id(&self) -> &'static str {
        self.descriptor().id
    }

    pub fn descriptor(&self) -> &'static ProviderDescriptor {
        BY_ID
            .get(self)
            .copied()
            .unwrap_or(&BUILTIN_PROVIDERS[0])
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        BUILTIN_PROVIDERS
            .iter()
            .find(|d| d.id.eq_ignore_ascii_case(raw))
            .map(|d| d.provider)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// How the resolved credential is attached to requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `<header>: <key>`
    Header(&'static str),
    /// `Authorization: Token <key>` (Deepgram)
    Token,
    /// No credential at all (local HTTP services).
    None,
}

/// What the provider is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Streaming text generation in the given dialect.
    Generation(RequestKind),
    /// Speech-to-text only; credentials and model discovery, no generation.
    Transcription,
}

/// Static description of a built-in provider.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub provider: ProviderId,
    /// Stable internal identifier.
    pub id: &'static str,
    pub display_name: &'static str,
    pub default_base_url: Option<&'static str>,
    pub default_model: &'static str,
    pub request_path: &'static str,
    pub capability: Capability,
    pub auth: AuthStyle,
    /// Secret-store key holding the API key.
    pub secret_key: &'static str,
    pub static_headers: &'static [(&'static str, &'static str)],
    pub static_query: &'static [(&'static str, &'static str)],
    /// "List models" endpoint used by discovery; `None` means use `known_models`.
    pub models_path: Option<&'static str>,
    pub known_models: &'static [&'static str],
}

impl ProviderDescriptor {
    pub fn requires_api_key(&self) -> bool {
        self.auth != AuthStyle::None
    }

    pub fn request_kind(&self) -> Option<RequestKind> {
        match self.capability {
            Capability::Generation(kind) => Some(kind),
            Capability::Transcription => None,
        }
    }
}

pub const OPENAI_CHAT_PATH: &str = "/v1/chat/completions";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const AZURE_DEFAULT_API_VERSION: &str = "2024-02-01";

pub static BUILTIN_PROVIDERS: &[ProviderDescriptor] = &[
    ProviderDescriptor {
        provider: ProviderId::OpenAi,
        id: "openai",
        display_name: "OpenAI",
        default_base_url: Some("https://api.openai.com"),
        default_model: "gpt-4o-mini",
        request_path: OPENAI_CHAT_PATH,
        capability: Capability::Generation(RequestKind::OpenAiChat),
        auth: AuthStyle::Bearer,
        secret_key: "ghosttype.api-key.openai",
        static_headers: &[],
        static_query: &[],
        models_path: Some("/v1/models"),
        known_models: &[],
    },
    ProviderDescriptor {
        provider: ProviderId::OpenAiResponses,
        id: "openai_responses",
        display_name: "OpenAI (Responses)",
        default_base_url: Some("https://api.openai.com"),
        default_model: "gpt-4o-mini",
        request_path: "/v1/responses",
        capability: Capability::Generation(RequestKind::OpenAiResponses),
        auth: AuthStyle::Bearer,
        secret_key: "ghosttype.api-key.openai",
        static_headers: &[],
        static_query: &[],
        models_path: Some("/v1/models"),
        known_models: &[],
    },
    ProviderDescriptor {
        provider: ProviderId::AzureOpenAi,
        id: "azure_openai",
        display_name: "Azure OpenAI",
        default_base_url: None,
        default_model: "",
        request_path: "/openai/deployments/{deployment}/chat/completions",
        capability: Capability::Generation(RequestKind::AzureOpenAiChat),
        auth: AuthStyle::Header("api-key"),
        secret_key: "ghosttype.api-key.azure-openai",
        static_headers: &[],
        static_query: &[],
        models_path: Some("/openai/deployments"),
        known_models: &[],
    },
    ProviderDescriptor {
        provider: ProviderId::Anthropic,
        id: "anthropic",
        display_name: "Anthropic",
        default_base_url: Some("https://api.anthropic.com"),
        default_model: "claude-3-5-haiku-latest",
        request_path: "/v1/messages",
        capability: Capability::Generation(RequestKind::Anthropic),
        auth: AuthStyle::Header("x-api-key"),
        secret_key: "ghosttype.api-key.anthropic",
        static_headers: &[("anthropic-version", ANTHROPIC_VERSION)],
        static_query: &[],
        models_path: Some("/v1/models"),
        known_models: &[],
    },
    ProviderDescriptor {
        provider: ProviderId::Gemini,
        id: "gemini",
        display_name: "Google Gemini",
        default_base_url: Some("https://generativelanguage.googleapis.com"),
        default_model: "gemini-2.0-flash",
        request_path: "/v1beta/models/{model}:streamGenerateContent",
        capability: Capability::Generation(RequestKind::Gemini),
        auth: AuthStyle::Header("x-goog-api-key"),
        secret_key: "ghosttype.api-key.gemini",
        static_headers: &[],
        static_query: &[("alt", "sse")],
        models_path: Some("/v1beta/models"),
        known_models: &[],
    },
    ProviderDescriptor {
        provider: ProviderId::Groq,
        id: "groq",
        display_name: "Groq",
        default_base_url: Some("https://api.groq.com/openai"),
        default_model: "llama-3.3-70b-versatile",
        request_path: OPENAI_CHAT_PATH,
        capability: Capability::Generation(RequestKind::OpenAiChat),
        auth: AuthStyle::Bearer,
        secret_key: "ghosttype.api-key.groq",
        static_headers: &[],
        static_query: &[],
        models_path: Some("/v1/models"),
        known_models: &[],
    },
    ProviderDescriptor {
        provider: ProviderId::DeepSeek,
        id: "deepseek",
        display_name: "DeepSeek",
        default_base_url: Some("https://api.deepseek.com"),
        default_model: "deepseek-chat",
        request_path: OPENAI_CHAT_PATH,
        capability: Capability::Generation(RequestKind::OpenAiChat),
        auth: AuthStyle::Bearer,
        secret_key: "ghosttype.api-key.deepseek",
        static_headers: &[],
        static_query: &[],
        models_path: Some("/v1/models"),
        known_models: &[],
    },
    ProviderDescriptor {
        provider: ProviderId::Ollama,
        id: "ollama",
        display_name: "Ollama",
        default_base_url: Some("http://127.0.0.1:11434"),
        default_model: "llama3.2",
        request_path: OPENAI_CHAT_PATH,
        capability: Capability::Generation(RequestKind::OpenAiChat),
        auth: AuthStyle::None,
        secret_key: "",
        static_headers: &[],
        static_query: &[],
        models_path: Some("/v1/models"),
        known_models: &[],
    },
    ProviderDescriptor {
        provider: ProviderId::LmStudio,
        id: "lm_studio",
        display_name: "LM Studio",
        default_base_url: Some("http://127.0.0.1:1234"),
        default_model: "local-model",
        request_path: OPENAI_CHAT_PATH,
        capability: Capability::Generation(RequestKind::OpenAiChat),
        auth: AuthStyle::None,
        secret_key: "",
        static_headers: &[],
        static_query: &[],
        models_path: Some("/v1/models"),
        known_models: &[],
    },
    ProviderDescriptor {
        provider: ProviderId::Deepgram,
        id: "deepgram",
        display_name: "Deepgram",
        default_base_url: Some("https://api.deepgram.com"),
        default_model: "nova-3",
        request_path: "/v1/listen",
        capability: Capability::Transcription,
        auth: AuthStyle::Token,
        secret_key: "ghosttype.api-key.deepgram",
        static_headers: &[],
        static_query: &[],
        models_path: Some("/v1/models"),
        known_models: &[],
    },
    ProviderDescriptor {
        provider: ProviderId::AssemblyAi,
        id: "assemblyai",
        display_name: "AssemblyAI",
        default_base_url: Some("https://api.assemblyai.com"),
        default_model: "universal",
        request_path: "/v2/transcript",
        capability: Capability::Transcription,
        auth: AuthStyle::Header("authorization"),
        secret_key: "ghosttype.api-key.assemblyai",
        static_headers: &[],
        static_query: &[],
        models_path: None,
        known_models: &["universal", "slam-1", "best", "nano"],
    },
];

static BY_ID: Lazy<HashMap<ProviderId, &'static ProviderDescriptor>> =
    Lazy::new(|| BUILTIN_PROVIDERS.iter().map(|d| (d.provider, d)).collect());
