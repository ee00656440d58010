//! Session Controller
//!
//! Owns login/logout and the cached current user.
//!
//! ```text
//! Anonymous --login--> Authenticating --token + /me--> Authenticated
//!     ^                      |                               |
//!     +------ failure -------+------ logout / 401 -----------+
//! ```

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::models::User;
use crate::resources::ApiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated,
}

/// Context held while authenticated
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user: User,
    pub token_type: String,
    pub established_at: DateTime<Utc>,
}

enum Phase {
    Anonymous,
    Authenticating,
    Authenticated(Session),
}

struct Inner {
    phase: Phase,
    /// Transport revocation count when the session was established
    epoch: u64,
}

/// Manages authentication state
pub struct SessionController {
    api: ApiClient,
    inner: Mutex<Inner>,
}

impl SessionController {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            inner: Mutex::new(Inner {
                phase: Phase::Anonymous,
                epoch: 0,
            }),
        }
    }

    /// Exchange credentials for a token, then resolve the current user.
    ///
    /// Concurrent logins are not serialized; if two succeed, the one that
    /// finishes last owns the token store. A failed login drops only the
    /// token that was stored when it started.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, ApiError> {
        self.lock().phase = Phase::Authenticating;
        info!("Logging in as: {}", username);
        let previous = self.api.transport().tokens().get();

        let result = self.establish(username, password).await;

        let mut inner = self.lock();
        match result {
            Ok(session) => {
                let user = session.user.clone();
                info!("Session established for user: {}", user.user_id);
                inner.epoch = self.api.transport().revocation_count();
                inner.phase = Phase::Authenticated(session);
                Ok(user)
            }
            Err(e) => {
                warn!("Login failed: {}", e);
                if matches!(inner.phase, Phase::Authenticating) {
                    inner.phase = Phase::Anonymous;
                    if let Some(previous) = previous {
                        self.api.transport().tokens().clear_if(&previous);
                    }
                }
                Err(e)
            }
        }
    }

    async fn establish(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        let transport = self.api.transport();
        let grant = transport.exchange_credentials(username, password).await?;

        transport.tokens().set(grant.access_token.as_str());

        let user = match self.api.me().await {
            Ok(user) => user,
            Err(e) => {
                transport.tokens().clear_if(&grant.access_token);
                return Err(e);
            }
        };

        Ok(Session {
            user,
            token_type: grant.token_type,
            established_at: Utc::now(),
        })
    }

    /// Resume a session from a token persisted by an earlier run.
    ///
    /// `Ok(None)` when there is no token or the backend no longer accepts it.
    pub async fn restore(&self) -> Result<Option<User>, ApiError> {
        if !self.api.transport().tokens().is_present() {
            return Ok(None);
        }

        self.lock().phase = Phase::Authenticating;
        let result = self.api.me().await;

        let mut inner = self.lock();
        match result {
            Ok(user) => {
                info!("Restored session for user: {}", user.user_id);
                inner.epoch = self.api.transport().revocation_count();
                inner.phase = Phase::Authenticated(Session {
                    user: user.clone(),
                    token_type: "bearer".to_string(),
                    established_at: Utc::now(),
                });
                Ok(Some(user))
            }
            Err(e) => {
                inner.phase = Phase::Anonymous;
                if e.is_auth_failure() {
                    info!("Stored token is no longer valid");
                    Ok(None)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Clear the token and the cached user
    pub fn logout(&self) {
        info!("Logging out");
        self.lock().phase = Phase::Anonymous;
        self.api.transport().tokens().clear();
    }

    pub fn state(&self) -> SessionState {
        match self.lock().phase {
            Phase::Anonymous => SessionState::Anonymous,
            Phase::Authenticating => SessionState::Authenticating,
            Phase::Authenticated(_) => SessionState::Authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    pub fn session(&self) -> Option<Session> {
        match &self.lock().phase {
            Phase::Authenticated(session) => Some(session.clone()),
            _ => None,
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.session().map(|s| s.user)
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Lock the state, first dropping an authenticated session the server
    /// has since rejected.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if matches!(inner.phase, Phase::Authenticated(_)) {
            let transport = self.api.transport();
            if transport.revocation_count() != inner.epoch || !transport.tokens().is_present() {
                info!("Session ended; re-authentication required");
                inner.phase = Phase::Anonymous;
            }
        }
        inner
    }
}
