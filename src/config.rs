//! Configuration management

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::resources::Page;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Console configuration, resolved once per process
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base address, without trailing slash
    pub api_url: String,

    /// Where the bearer token is persisted
    pub data_dir: PathBuf,

    pub log_dir: PathBuf,

    /// Per-request timeout. `None` leaves it to the network stack.
    pub request_timeout: Option<Duration>,

    /// Default page size for list calls
    pub page_limit: u32,
}

impl Config {
    /// Load configuration from the environment (and `.env`, if present)
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let api_url = std::env::var("FACILITY_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let data_dir = std::env::var("FACILITY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let log_dir = std::env::var("FACILITY_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("logs"));

        let request_timeout = match std::env::var("FACILITY_API_TIMEOUT_SECS") {
            Ok(raw) => Some(Duration::from_secs(
                raw.parse().context("FACILITY_API_TIMEOUT_SECS must be a whole number of seconds")?,
            )),
            Err(_) => None,
        };

        let page_limit = std::env::var("FACILITY_PAGE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Page::DEFAULT_LIMIT);

        Self {
            api_url,
            data_dir,
            log_dir,
            request_timeout,
            page_limit,
        }
        .with_api_url(None)
    }

    /// Override the base address; `None` re-validates the current one
    pub fn with_api_url(mut self, api_url: Option<&str>) -> Result<Self> {
        let raw = api_url.unwrap_or(self.api_url.as_str());
        let parsed = reqwest::Url::parse(raw)
            .with_context(|| format!("invalid API URL: {}", raw))?;
        anyhow::ensure!(
            matches!(parsed.scheme(), "http" | "https"),
            "API URL must be http or https: {}",
            raw
        );
        self.api_url = raw.trim_end_matches('/').to_string();
        Ok(self)
    }

    /// First page at the configured size
    pub fn page(&self) -> Page {
        Page::new(0, self.page_limit)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("FacilityConsole")
}
