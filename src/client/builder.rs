use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::client::core::Gateway;
use crate::credentials::{CredentialResolver, KeyringSecretStore, SecretStore};
use crate::pipeline::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use crate::transport::HttpTransport;
use crate::{Error, ErrorContext, Result};

/// Builder for [`Gateway`].
///
/// Keep this surface area small: everything per-call comes from the
/// [`UserConfig`](crate::config::UserConfig) snapshot instead.
pub struct GatewayBuilder {
    secret_store: Option<Arc<dyn SecretStore>>,
    http_client: Option<reqwest::Client>,
    retry_base_delay: Option<Duration>,
    retry_max_delay: Option<Duration>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            secret_store: None,
            http_client: None,
            retry_base_delay: None,
            retry_max_delay: None,
        }
    }

    /// Where saved API keys are read from. Default is the OS keychain.
    pub fn secret_store(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.secret_store = Some(store);
        self
    }

    /// Use a preconfigured `reqwest` client instead of the env-tuned default.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Override the retry backoff bounds.
    ///
    /// Also configurable via env:
    /// - `GHOSTTYPE_RETRY_BASE_DELAY_MS` (default 250)
    /// - `GHOSTTYPE_RETRY_MAX_DELAY_MS` (default 4000)
    pub fn retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = Some(base);
        self.retry_max_delay = Some(max);
        self
    }

    pub fn build(self) -> Result<Gateway> {
        let transport = match self.http_client {
            Some(client) => HttpTransport::with_client(client),
            None => HttpTransport::new().map_err(|e| {
                Error::configuration_with_context(
                    "failed to build HTTP client",
                    ErrorContext::new()
                        .with_details(e.to_string())
                        .with_source("http_transport"),
                )
            })?,
        };

        let store = self
            .secret_store
            .unwrap_or_else(|| Arc::new(KeyringSecretStore::new()));

        let base = self
            .retry_base_delay
            .or_else(|| env_millis("GHOSTTYPE_RETRY_BASE_DELAY_MS"))
            .unwrap_or(DEFAULT_BASE_DELAY);
        let max = self
            .retry_max_delay
            .or_else(|| env_millis("GHOSTTYPE_RETRY_MAX_DELAY_MS"))
            .unwrap_or(DEFAULT_MAX_DELAY)
            .max(base);

        Ok(Gateway::from_parts(
            transport,
            CredentialResolver::new(store),
            base,
            max,
        ))
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}
