//! Client configuration parsed from environment variables.

use std::time::Duration;

use crate::error::ApiError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STALE_TIME_MS: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base endpoint, without trailing slash. Paths such as `/auth/login` are appended.
    pub api_url: String,
    pub timeouts: Timeouts,
    /// How long a fetched value counts as fresh. Zero re-validates on every read.
    pub stale_time: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            timeouts: Timeouts::default(),
            stale_time: Duration::from_millis(DEFAULT_STALE_TIME_MS),
        }
    }
}

impl ClientConfig {
    /// Config pointed at an explicit base URL, defaults elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if the URL is not absolute http(s).
    pub fn with_api_url(api_url: &str) -> Result<Self, ApiError> {
        Ok(Self { api_url: normalize_api_url(api_url)?, ..Self::default() })
    }

    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `ANIMAFORGE_API_URL`: base endpoint (falls back to `NEXT_PUBLIC_API_URL`,
    ///   then `http://localhost:8000/api`)
    /// - `ANIMAFORGE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `ANIMAFORGE_CONNECT_TIMEOUT_SECS`: default 10
    /// - `ANIMAFORGE_STALE_TIME_MS`: default 0
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if the base URL is malformed.
    pub fn from_env() -> Result<Self, ApiError> {
        let raw_url = std::env::var("ANIMAFORGE_API_URL")
            .or_else(|_| std::env::var("NEXT_PUBLIC_API_URL"))
            .unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        let api_url = normalize_api_url(&raw_url)?;

        let timeouts = Timeouts {
            request_secs: env_parse_u64("ANIMAFORGE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("ANIMAFORGE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let stale_time = Duration::from_millis(env_parse_u64("ANIMAFORGE_STALE_TIME_MS", DEFAULT_STALE_TIME_MS));

        Ok(Self { api_url, timeouts, stale_time })
    }

    #[must_use]
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn normalize_api_url(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let has_scheme = trimmed.starts_with("http://") || trimmed.starts_with("https://");
    let has_host = trimmed.split_once("://").is_some_and(|(_, rest)| !rest.is_empty());
    if !has_scheme || !has_host {
        return Err(ApiError::Config(format!("invalid API base URL: {raw:?}")));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
