//! Token Store
//!
//! Holds at most one bearer token for the whole process and mirrors it to
//! [`SecureStorage`] so it survives a restart of the console.

use std::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::storage::SecureStorage;

/// Well-known storage key for the bearer token
pub const TOKEN_KEY: &str = "mcs_auth_token";

pub struct TokenStore {
    current: RwLock<Option<String>>,
    storage: Option<SecureStorage>,
}

impl TokenStore {
    /// Open a store backed by `storage`, picking up any previously persisted token
    pub fn persistent(storage: SecureStorage) -> Self {
        let current = match storage.load::<String>(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!("Ignoring unreadable stored token: {}", e);
                None
            }
        };

        if current.is_some() {
            debug!("Restored persisted bearer token");
        }

        Self {
            current: RwLock::new(current),
            storage: Some(storage),
        }
    }

    /// A store that lives only as long as the process
    pub fn ephemeral() -> Self {
        Self {
            current: RwLock::new(None),
            storage: None,
        }
    }

    /// Replace the stored token. Persistence failures are logged; the
    /// in-memory value applies regardless.
    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.save(TOKEN_KEY, &token) {
                error!("Failed to persist bearer token: {}", e);
            }
        }

        *self.write() = Some(token);
        info!("Bearer token stored");
    }

    pub fn get(&self) -> Option<String> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_present(&self) -> bool {
        self.get().is_some()
    }

    /// Remove the token. Idempotent.
    pub fn clear(&self) {
        let had_token = self.write().take().is_some();
        self.forget_persisted();

        if had_token {
            info!("Bearer token cleared");
        }
    }

    /// Clear only if the stored token is still `expected`.
    ///
    /// Returns `true` when this call removed it. A response to a request sent
    /// with an older token must not erase a token stored after it was sent.
    pub fn clear_if(&self, expected: &str) -> bool {
        let mut guard = self.write();
        if guard.as_deref() != Some(expected) {
            return false;
        }
        *guard = None;
        drop(guard);

        self.forget_persisted();
        info!("Bearer token revoked");
        true
    }

    fn forget_persisted(&self) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.delete(TOKEN_KEY) {
                error!("Failed to delete persisted token: {}", e);
            }
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<String>> {
        match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::ephemeral()
    }
}
