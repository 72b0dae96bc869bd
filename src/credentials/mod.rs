//! 凭证解析：输入框中的密钥优先，其次读取持久化的密钥
//!
//! Credential resolution. A key typed into the settings form wins over a saved
//! one; otherwise the secret store is consulted without ever prompting. Providers
//! that need no authentication always resolve to an empty key.

pub mod store;

use std::sync::Arc;
use tracing::warn;

use crate::config::{AuthMode, ProviderSelection, UserConfig};
use crate::{Error, Result};

pub use store::{KeyringSecretStore, MemorySecretStore, SecretLookup, SecretStore};

/// Resolves API keys for a provider selection.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn SecretStore>,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Whether `provider` under `auth_mode` needs a non-empty key.
    ///
    /// `auth_mode` only matters for custom providers; built-in ones use their registry auth style.
    pub fn requires_key(provider: &ProviderSelection, auth_mode: AuthMode) -> bool {
        match provider {
            ProviderSelection::Builtin { provider } => provider.descriptor().requires_api_key(),
            ProviderSelection::Custom { .. } => auth_mode == AuthMode::Bearer,
            ProviderSelection::Local { .. } => false,
        }
    }

    /// Where the persisted secret for `provider` lives.
    pub fn secret_lookup(provider: &ProviderSelection) -> Option<SecretLookup> {
        match provider {
            ProviderSelection::Builtin { provider } => {
                let key = provider.descriptor().secret_key;
                (!key.is_empty()).then(|| SecretLookup::Key(key.to_string()))
            }
            ProviderSelection::Custom { secret_ref, .. } => {
                let reference = secret_ref.trim();
                (!reference.is_empty()).then(|| SecretLookup::Reference(reference.to_string()))
            }
            ProviderSelection::Local { .. } => None,
        }
    }

    /// Resolve a key; never fails. Absence yields an empty string.
    pub async fn resolve(
        &self,
        provider: &ProviderSelection,
        auth_mode: AuthMode,
        typed_input: &str,
        lookup: Option<&SecretLookup>,
    ) -> String {
        if !Self::requires_key(provider, auth_mode) {
            return String::new();
        }

        let typed = typed_input.trim();
        if !typed.is_empty() {
            return typed.to_string();
        }

        let Some(lookup) = lookup else {
            return String::new();
        };

        match self.store.get_secret(lookup).await {
            Ok(Some(secret)) => secret.trim().to_string(),
            Ok(None) => String::new(),
            Err(e) => {
                warn!(
                    provider = provider.label().as_str(),
                    error = %e,
                    "secret lookup failed; treating key as absent"
                );
                String::new()
            }
        }
    }

    /// Resolve the key for `config`, failing with `MissingApiKey` when one is required.
    pub async fn resolve_for(&self, config: &UserConfig) -> Result<String> {
        let lookup = Self::secret_lookup(&config.provider);
        let key = self
            .resolve(
                &config.provider,
                config.auth_mode,
                &config.api_key_input,
                lookup.as_ref(),
            )
            .await;
        if key.is_empty() && Self::requires_key(&config.provider, config.auth_mode) {
            return Err(Error::missing_api_key(config.provider.label()));
        }
        Ok(key)
    }
}
