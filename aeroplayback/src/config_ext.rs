//! Playback settings stored in aeroconfig (`playback.*` keys).

use std::time::Duration;

use aeroconfig::{u64_value, value_as_u64, Config};
use anyhow::Result;

use crate::hls::{HlsSettings, DEFAULT_MANIFEST_RETRIES, DEFAULT_REQUEST_TIMEOUT};
use crate::session::DEFAULT_PROBE_INTERVAL;
use crate::source::ReplayUrlPolicy;

const PROBE_INTERVAL_MS: &[&str] = &["playback", "probe_interval_ms"];
const REPLAY_URL_TEMPLATE: &[&str] = &["playback", "replay_url_template"];
const MANIFEST_RETRIES: &[&str] = &["playback", "manifest_retries"];
const REQUEST_TIMEOUT_SECS: &[&str] = &["playback", "request_timeout_secs"];

pub trait PlaybackConfigExt {
    /// Delay between two LIVE probes while a session plays REPLAY.
    fn get_playback_probe_interval(&self) -> Result<Duration>;
    fn set_playback_probe_interval(&self, interval: Duration) -> Result<()>;

    /// Empty template means the replay window is served on the live URL.
    fn get_playback_replay_url_policy(&self) -> Result<ReplayUrlPolicy>;
    fn set_playback_replay_url_template(&self, template: &str) -> Result<()>;

    fn get_playback_manifest_retries(&self) -> Result<u32>;
    fn set_playback_manifest_retries(&self, retries: u32) -> Result<()>;

    /// Timeout of one playlist or segment request.
    fn get_playback_request_timeout(&self) -> Result<Duration>;
    fn set_playback_request_timeout(&self, timeout: Duration) -> Result<()>;

    /// HLS engine settings derived from the keys above.
    fn get_playback_hls_settings(&self) -> Result<HlsSettings>;
}

impl PlaybackConfigExt for Config {
    fn get_playback_probe_interval(&self) -> Result<Duration> {
        match value_as_u64(self.get_value(PROBE_INTERVAL_MS).ok()) {
            Some(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
            _ => {
                self.set_playback_probe_interval(DEFAULT_PROBE_INTERVAL)?;
                Ok(DEFAULT_PROBE_INTERVAL)
            }
        }
    }

    fn set_playback_probe_interval(&self, interval: Duration) -> Result<()> {
        self.set_value(PROBE_INTERVAL_MS, u64_value(interval.as_millis() as u64))
    }

    fn get_playback_replay_url_policy(&self) -> Result<ReplayUrlPolicy> {
        Ok(ReplayUrlPolicy::from_template(
            &self.get_string_or(REPLAY_URL_TEMPLATE, ""),
        ))
    }

    fn set_playback_replay_url_template(&self, template: &str) -> Result<()> {
        self.set_string(REPLAY_URL_TEMPLATE, template)
    }

    fn get_playback_manifest_retries(&self) -> Result<u32> {
        match value_as_u64(self.get_value(MANIFEST_RETRIES).ok()) {
            Some(retries) if retries > 0 => Ok(u32::try_from(retries).unwrap_or(u32::MAX)),
            _ => {
                self.set_playback_manifest_retries(DEFAULT_MANIFEST_RETRIES)?;
                Ok(DEFAULT_MANIFEST_RETRIES)
            }
        }
    }

    fn set_playback_manifest_retries(&self, retries: u32) -> Result<()> {
        self.set_value(MANIFEST_RETRIES, u64_value(retries as u64))
    }

    fn get_playback_request_timeout(&self) -> Result<Duration> {
        match value_as_u64(self.get_value(REQUEST_TIMEOUT_SECS).ok()) {
            Some(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => {
                self.set_playback_request_timeout(DEFAULT_REQUEST_TIMEOUT)?;
                Ok(DEFAULT_REQUEST_TIMEOUT)
            }
        }
    }

    fn set_playback_request_timeout(&self, timeout: Duration) -> Result<()> {
        self.set_value(REQUEST_TIMEOUT_SECS, u64_value(timeout.as_secs().max(1)))
    }

    fn get_playback_hls_settings(&self) -> Result<HlsSettings> {
        Ok(HlsSettings {
            manifest_retries: self.get_playback_manifest_retries()?,
            request_timeout: self.get_playback_request_timeout()?,
            ..HlsSettings::default()
        })
    }
}
