//! Bearer token persistence in the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use examda_core::gateway::TokenProvider;
#[cfg(not(test))]
use keyring::Entry;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "examda-cli";

/// Token for one API base URL, stored under its own keychain entry.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    username: String,
}

impl KeyringTokenStore {
    pub fn for_api(api_base_url: &str) -> Self {
        Self {
            username: format!("access_token:{api_base_url}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<Entry, String> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username).map_err(|error| error.to_string())
    }

    #[cfg(not(test))]
    pub fn load(&self) -> Result<Option<String>, String> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(error.to_string()),
        }
    }

    #[cfg(test)]
    pub fn load(&self) -> Result<Option<String>, String> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| error.to_string())?;
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    pub fn save(&self, token: &str) -> Result<(), String> {
        self.entry()?
            .set_password(token)
            .map_err(|error| error.to_string())
    }

    #[cfg(test)]
    pub fn save(&self, token: &str) -> Result<(), String> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| error.to_string())?;
        guard.insert(self.username.clone(), token.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    pub fn clear(&self) -> Result<(), String> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(error.to_string()),
        }
    }

    #[cfg(test)]
    pub fn clear(&self) -> Result<(), String> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| error.to_string())?;
        guard.remove(&self.username);
        Ok(())
    }
}

#[async_trait]
impl TokenProvider for KeyringTokenStore {
    async fn token(&self) -> Option<String> {
        match self.load() {
            Ok(token) => token,
            Err(error) => {
                tracing::warn!("Failed to read stored token: {error}");
                None
            }
        }
    }

    async fn invalidate(&self) {
        if let Err(error) = self.clear() {
            tracing::warn!("Failed to clear rejected token: {error}");
        } else {
            tracing::info!("Stored token was rejected; sign in again");
        }
    }
}
