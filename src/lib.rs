//! Facility Console Library
//!
//! Authenticated client for the facility-monitoring backend: token
//! persistence, transport, typed resources, session control and the
//! statistics shown on the dashboard and reports pages.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod resources;
pub mod session;
pub mod stats;
pub mod storage;
pub mod token;
pub mod transport;

use std::sync::Arc;

use config::Config;
use resources::ApiClient;
use session::SessionController;
use storage::SecureStorage;
use token::TokenStore;
use transport::Transport;

pub use error::{ApiError, ErrorKind};

/// Application state shared by every console command
pub struct AppState {
    pub config: Config,
    pub tokens: Arc<TokenStore>,
    pub api: ApiClient,
    pub session: SessionController,
}

impl AppState {
    /// Wire the client stack from `config`, restoring any persisted token
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let tokens = Arc::new(TokenStore::persistent(SecureStorage::open(&config.data_dir)));
        Self::with_tokens(config, tokens)
    }

    /// Wire the client stack around an existing token store
    pub fn with_tokens(config: Config, tokens: Arc<TokenStore>) -> anyhow::Result<Self> {
        let transport = Transport::new(&config.api_url, config.request_timeout, tokens.clone())?;
        let api = ApiClient::new(Arc::new(transport));
        let session = SessionController::new(api.clone());

        Ok(Self {
            config,
            tokens,
            api,
            session,
        })
    }
}
