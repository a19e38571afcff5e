//! Client settings for the SoilGrids REST API.
//!
//! Values come from built-in defaults, the process environment (with `.env`
//! support through `dotenvy`) or a JSON file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://rest.isric.org/soilgrids/v2.0/";

/// SoilGrids asks for at most five requests per minute.
pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_secs(12);

pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(60);

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Minimum spacing between consecutive requests.
    pub request_interval: Duration,
    /// Pause before the single retry after a `429 Too Many Requests`.
    pub retry_wait: Duration,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_interval: DEFAULT_REQUEST_INTERVAL,
            retry_wait: DEFAULT_RETRY_WAIT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// On-disk shape. Every field is optional and falls back to the default.
///
/// ```json
/// {
///   "base_url": "https://rest.isric.org/soilgrids/v2.0/",
///   "request_interval_secs": 12,
///   "retry_wait_secs": 60,
///   "timeout_secs": 30
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    request_interval_secs: Option<u64>,
    retry_wait_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

impl ClientConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
        let file: ConfigFile =
            serde_json::from_str(&content).with_context(|| format!("parsing config {path}"))?;

        let defaults = Self::default();
        Ok(Self {
            base_url: file.base_url.unwrap_or(defaults.base_url),
            request_interval: file
                .request_interval_secs
                .map_or(defaults.request_interval, Duration::from_secs),
            retry_wait: file
                .retry_wait_secs
                .map_or(defaults.retry_wait, Duration::from_secs),
            timeout: file.timeout_secs.map_or(defaults.timeout, Duration::from_secs),
        })
    }

    /// Reads `SOILGRIDS_*` variables, loading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secs = |key: &str, default: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => {
                    let secs: u64 = raw
                        .trim()
                        .parse()
                        .with_context(|| format!("{key} must be a whole number of seconds"))?;
                    Ok(Duration::from_secs(secs))
                }
                None => Ok(default),
            }
        };

        let defaults = Self::default();
        Ok(Self {
            base_url: lookup("SOILGRIDS_BASE_URL").unwrap_or(defaults.base_url),
            request_interval: secs("SOILGRIDS_REQUEST_INTERVAL_SECS", defaults.request_interval)?,
            retry_wait: secs("SOILGRIDS_RETRY_WAIT_SECS", defaults.retry_wait)?,
            timeout: secs("SOILGRIDS_TIMEOUT_SECS", defaults.timeout)?,
        })
    }
}
