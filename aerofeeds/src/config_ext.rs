//! Backend settings stored in aeroconfig
//!
//! The `FeedsConfigExt` trait adds accessors for the `backend.*` keys to
//! `aeroconfig::Config`.
//!
//! # Example
//!
//! ```no_run
//! use aeroconfig::get_config;
//! use aerofeeds::{FeedsClient, FeedsConfigExt};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = get_config();
//! println!("Registry: {}", config.get_feeds_api_base()?);
//! let client = FeedsClient::from_config(&config)?;
//! # Ok(())
//! # }
//! ```

use crate::client::{
    DEFAULT_ANALYTICS_BASE, DEFAULT_API_BASE, DEFAULT_BRIDGE_BASE, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use aeroconfig::{u64_value, value_as_u64, Config};
use anyhow::Result;
use serde_yaml::Value;

const API_BASE: &[&str] = &["backend", "api_base"];
const ANALYTICS_BASE: &[&str] = &["backend", "analytics_base"];
const BRIDGE_BASE: &[&str] = &["backend", "bridge_base"];
const HLS_PROXY_BASE: &[&str] = &["backend", "hls_proxy_base"];
const REQUEST_TIMEOUT: &[&str] = &["backend", "request_timeout_secs"];

/// Extension trait for the backend configuration
///
/// Getters persist the default value when the key is missing.
pub trait FeedsConfigExt {
    /// Stream registry base URL
    fn get_feeds_api_base(&self) -> Result<String>;
    fn set_feeds_api_base(&self, url: &str) -> Result<()>;

    /// Analytics service base URL
    fn get_feeds_analytics_base(&self) -> Result<String>;
    fn set_feeds_analytics_base(&self, url: &str) -> Result<()>;

    /// Incident bridge base URL
    fn get_feeds_bridge_base(&self) -> Result<String>;
    fn set_feeds_bridge_base(&self, url: &str) -> Result<()>;

    /// Base URL the HLS playlists are proxied through, `None` when playback
    /// should use `hlsUrl` as-is
    fn get_feeds_hls_proxy_base(&self) -> Result<Option<String>>;
    fn set_feeds_hls_proxy_base(&self, url: Option<&str>) -> Result<()>;

    /// Per-request timeout in seconds
    fn get_feeds_request_timeout_secs(&self) -> Result<u64>;
    fn set_feeds_request_timeout_secs(&self, secs: u64) -> Result<()>;
}

fn string_or_persist(config: &Config, path: &[&str], default: &str) -> Result<String> {
    match config.get_value(path) {
        Ok(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => {
            config.set_string(path, default)?;
            Ok(default.to_string())
        }
    }
}

impl FeedsConfigExt for Config {
    fn get_feeds_api_base(&self) -> Result<String> {
        string_or_persist(self, API_BASE, DEFAULT_API_BASE)
    }

    fn set_feeds_api_base(&self, url: &str) -> Result<()> {
        self.set_string(API_BASE, url)
    }

    fn get_feeds_analytics_base(&self) -> Result<String> {
        string_or_persist(self, ANALYTICS_BASE, DEFAULT_ANALYTICS_BASE)
    }

    fn set_feeds_analytics_base(&self, url: &str) -> Result<()> {
        self.set_string(ANALYTICS_BASE, url)
    }

    fn get_feeds_bridge_base(&self) -> Result<String> {
        string_or_persist(self, BRIDGE_BASE, DEFAULT_BRIDGE_BASE)
    }

    fn set_feeds_bridge_base(&self, url: &str) -> Result<()> {
        self.set_string(BRIDGE_BASE, url)
    }

    fn get_feeds_hls_proxy_base(&self) -> Result<Option<String>> {
        let base = self.get_string_or(HLS_PROXY_BASE, "");
        let base = base.trim();
        Ok((!base.is_empty()).then(|| base.to_string()))
    }

    fn set_feeds_hls_proxy_base(&self, url: Option<&str>) -> Result<()> {
        self.set_string(HLS_PROXY_BASE, url.unwrap_or_default())
    }

    fn get_feeds_request_timeout_secs(&self) -> Result<u64> {
        match value_as_u64(self.get_value(REQUEST_TIMEOUT).ok()) {
            Some(secs) if secs > 0 => Ok(secs),
            _ => {
                self.set_feeds_request_timeout_secs(DEFAULT_REQUEST_TIMEOUT_SECS)?;
                Ok(DEFAULT_REQUEST_TIMEOUT_SECS)
            }
        }
    }

    fn set_feeds_request_timeout_secs(&self, secs: u64) -> Result<()> {
        self.set_value(REQUEST_TIMEOUT, u64_value(secs))
    }
}
