//! # ghosttype-gateway
//!
//! 统一云端推理网关：一个流式调用契约，覆盖多家云端 ASR/LLM 厂商。
//!
//! Unified cloud inference gateway. One vendor-neutral completion request goes
//! in; the gateway resolves credentials and endpoint, serializes the request for
//! the selected vendor's dialect, streams the response, reconciles delta and
//! cumulative fragments into one monotonic output, and applies retry, timeout,
//! concurrency and cancellation policy the same way for every vendor.
//!
//! ## Supported vendors
//!
//! OpenAI (Chat Completions and Responses), Azure OpenAI, Anthropic Messages,
//! Google Gemini, Groq, DeepSeek, Ollama, LM Studio and user-defined
//! OpenAI-compatible endpoints. Deepgram and AssemblyAI are known for credentials
//! and model discovery only.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ghosttype_gateway::{Gateway, Message, UnifiedRequest, UserConfig};
//! use ghosttype_gateway::registry::ProviderId;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> ghosttype_gateway::Result<()> {
//!     let gateway = Gateway::new()?;
//!     let config = UserConfig::for_provider(ProviderId::OpenAi);
//!     let request = UnifiedRequest::builder()
//!         .system_prompt("Fix grammar. Reply with the corrected text only.")
//!         .message(Message::user("their going to the meeting tomorow"))
//!         .build();
//!
//!     let out = gateway
//!         .stream_generate(&config, &request, |t| print!("{t}"), &CancellationToken::new())
//!         .await?;
//!     println!("\n{} ms to first token", out.first_token_latency_ms.unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Gateway`] entry points, admission gates, model discovery |
//! | [`config`] | [`UserConfig`] snapshot and clamping |
//! | [`credentials`] | API key resolution over a [`SecretStore`](credentials::SecretStore) |
//! | [`registry`] | Built-in provider descriptors |
//! | [`runtime`] | Per-call [`RuntimeConfig`](runtime::RuntimeConfig) resolution |
//! | [`drivers`] | Dialect request builders and stream event parsers |
//! | [`pipeline`] | SSE decoding, reconciliation, retry |
//! | [`transport`] | Shared `reqwest` transport |
//! | [`types`] | Requests, messages and results |

pub mod client;
pub mod config;
pub mod credentials;
pub mod drivers;
pub mod pipeline;
pub mod registry;
pub mod runtime;
pub mod transport;
pub mod types;

pub use client::{Gateway, GatewayBuilder, GenerationHandle, SignalsSnapshot};
pub use config::{AuthMode, ProviderSelection, UserConfig};
pub use runtime::RuntimeConfig;
pub use types::{
    CallStats, GenerationOutput, Message, MessageRole, ResponseFormat, UnifiedRequest,
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A specialized Result for pipeline operations
pub type PipeResult<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `PipeResult<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = PipeResult<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
