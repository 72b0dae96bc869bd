//! Results reported back to the caller of a generation.

use serde::{Deserialize, Serialize};

/// Per-call diagnostics, filled in as the call progresses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallStats {
    pub provider_id: String,
    pub model: String,
    /// Connect attempts made, including the successful one.
    pub attempts: u32,
    pub http_status: u16,
    /// Our own correlation id, sent as `x-client-request-id`.
    pub client_request_id: String,
    /// Vendor request id from the response headers, when present.
    pub upstream_request_id: Option<String>,
    pub duration_ms: u128,
}

/// Final result of a streaming generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub output: String,
    pub first_token_latency_ms: Option<f64>,
    pub output_language_policy: String,
    pub stats: CallStats,
}
