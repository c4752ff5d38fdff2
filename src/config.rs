//! Client configuration.
//!
//! Settings come from environment variables with defaults suitable for local
//! development. A `.env` file is honored if present.

use std::path::PathBuf;

use anyhow::Result;

/// Application name used for the credential directory path
const APP_NAME: &str = "showcase-client";

/// Default API base URL for local development
const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Upper bound on the credential refresh call.
/// A refresh that has not settled by then is treated as a failed refresh.
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub refresh_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the environment.
    ///
    /// Recognized variables: `SHOWCASE_API_URL`, `SHOWCASE_TIMEOUT_SECS`,
    /// `SHOWCASE_REFRESH_TIMEOUT_SECS`.
    pub fn load() -> Self {
        // Load .env file if present (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        Self {
            base_url: std::env::var("SHOWCASE_API_URL").unwrap_or(defaults.base_url),
            request_timeout_secs: env_u64("SHOWCASE_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout_secs),
            refresh_timeout_secs: env_u64("SHOWCASE_REFRESH_TIMEOUT_SECS")
                .unwrap_or(defaults.refresh_timeout_secs),
        }
    }

    /// Directory for the persisted credential file.
    pub fn credential_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
