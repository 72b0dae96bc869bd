//! Secret stores. Lookups are always non-interactive: a missing secret is `Ok(None)`.

use async_trait::async_trait;
use keyring::Entry;
use std::collections::HashMap;
use std::env;
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::Result;

/// Default keychain service name.
pub const KEYRING_SERVICE: &str = "ghosttype";

/// How a secret is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SecretLookup {
    /// Fixed per-provider key (built-in providers).
    Key(String),
    /// Free-form reference typed by the user (custom providers).
    Reference(String),
}

impl SecretLookup {
    pub fn as_str(&self) -> &str {
        match self {
            SecretLookup::Key(k) | SecretLookup::Reference(k) => k,
        }
    }
}

/// Read access to persisted secrets.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, lookup: &SecretLookup) -> Result<Option<String>>;
}

/// OS keychain via `keyring`, with an environment-variable fallback for built-in keys.
#[derive(Debug, Clone)]
pub struct KeyringSecretStore {
    service: String,
    env_fallback: bool,
}

impl KeyringSecretStore {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            env_fallback: true,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn without_env_fallback(mut self) -> Self {
        self.env_fallback = false;
        self
    }

    /// `service/account` addresses another keychain service; anything else is an
    /// account under the default service.
    fn entry_coordinates(&self, lookup: &SecretLookup) -> (String, String) {
        match lookup {
            SecretLookup::Key(key) => (self.service.clone(), key.clone()),
            SecretLookup::Reference(reference) => match reference.split_once('/') {
                Some((service, account)) if !service.is_empty() && !account.is_empty() => {
                    (service.to_string(), account.to_string())
                }
                _ => (self.service.clone(), reference.clone()),
            },
        }
    }

    /// `ghosttype.api-key.azure-openai` -> `AZURE_OPENAI_API_KEY`
    fn env_var_name(key: &str) -> Option<String> {
        let provider = key.rsplit('.').next()?;
        if provider.is_empty() {
            return None;
        }
        Some(format!(
            "{}_API_KEY",
            provider.replace('-', "_").to_uppercase()
        ))
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Keychain read; any backend failure counts as "not saved".
fn keychain_lookup(service: &str, account: &str) -> Option<String> {
    let entry = match Entry::new(service, account) {
        Ok(entry) => entry,
        Err(e) => {
            debug!(source = "keyring", service, error = %e, "keychain entry unavailable");
            return None;
        }
    };
    match entry.get_password() {
        Ok(secret) => Some(secret),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            debug!(source = "keyring", service, error = %e, "keychain lookup failed");
            None
        }
    }
}

#[async_trait]
impl SecretStore for KeyringSecretStore {
    async fn get_secret(&self, lookup: &SecretLookup) -> Result<Option<String>> {
        let (service, account) = self.entry_coordinates(lookup);
        // Keychain access can block on the platform daemon.
        let from_keyring =
            match tokio::task::spawn_blocking(move || keychain_lookup(&service, &account)).await {
                Ok(secret) => secret,
                Err(e) => {
                    warn!(source = "keyring", error = %e, "keychain lookup task failed");
                    None
                }
            };

        if from_keyring.is_some() {
            return Ok(from_keyring);
        }

        if self.env_fallback {
            if let SecretLookup::Key(key) = lookup {
                if let Some(var) = Self::env_var_name(key) {
                    return Ok(env::var(var).ok().filter(|v| !v.trim().is_empty()));
                }
            }
        }
        Ok(None)
    }
}

/// In-process secret map.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<SecretLookup, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, lookup: SecretLookup, secret: impl Into<String>) {
        if let Ok(mut guard) = self.secrets.write() {
            guard.insert(lookup, secret.into());
        }
    }

    pub fn with_key(self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.insert(SecretLookup::Key(key.into()), secret);
        self
    }

    pub fn with_reference(self, reference: impl Into<String>, secret: impl Into<String>) -> Self {
        self.insert(SecretLookup::Reference(reference.into()), secret);
        self
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, lookup: &SecretLookup) -> Result<Option<String>> {
        Ok(self
            .secrets
            .read()
            .ok()
            .and_then(|guard| guard.get(lookup).cloned()))
    }
}
