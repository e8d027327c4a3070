//! Monitor settings stored in aeroconfig (`monitor.*` keys).

use std::time::Duration;

use aeroconfig::{u64_value, value_as_u64, Config};
use aerofeeds::{TileOrder, VisibilityPolicy};
use anyhow::Result;
use serde_yaml::Value;
use tracing::warn;

use crate::analytics_poller::{DEFAULT_ANALYTICS_INTERVAL, DEFAULT_ANALYTICS_MAX_STREAMS};
use crate::streams_poller::DEFAULT_STREAMS_INTERVAL;

const STREAMS_INTERVAL_MS: &[&str] = &["monitor", "streams_interval_ms"];
const ANALYTICS_INTERVAL_MS: &[&str] = &["monitor", "analytics_interval_ms"];
const ANALYTICS_MAX_STREAMS: &[&str] = &["monitor", "analytics_max_streams"];
const HIDE_PENDING: &[&str] = &["monitor", "visibility", "hide_pending"];
const LIVE_ONLY: &[&str] = &["monitor", "visibility", "live_only"];
const RECENT_WINDOW_SECS: &[&str] = &["monitor", "visibility", "recent_window_secs"];
const ORDER: &[&str] = &["monitor", "visibility", "order"];
const MAX_TILES: &[&str] = &["monitor", "visibility", "max_tiles"];

pub trait MonitorConfigExt {
    fn get_monitor_streams_interval(&self) -> Result<Duration>;
    fn set_monitor_streams_interval(&self, interval: Duration) -> Result<()>;

    fn get_monitor_analytics_interval(&self) -> Result<Duration>;
    fn set_monitor_analytics_interval(&self, interval: Duration) -> Result<()>;

    /// Number of streams analysed per analytics round
    fn get_monitor_analytics_max_streams(&self) -> Result<usize>;
    fn set_monitor_analytics_max_streams(&self, max: usize) -> Result<()>;

    /// Tile visibility rules from `monitor.visibility.*`
    ///
    /// `recent_window_secs: 0` disables the age filter, `max_tiles: 0`
    /// removes the tile limit.
    fn get_monitor_visibility_policy(&self) -> Result<VisibilityPolicy>;
    fn set_monitor_visibility_policy(&self, policy: &VisibilityPolicy) -> Result<()>;
}

fn duration_ms_or_persist(config: &Config, path: &[&str], default: Duration) -> Result<Duration> {
    match value_as_u64(config.get_value(path).ok()) {
        Some(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => {
            config.set_value(path, u64_value(default.as_millis() as u64))?;
            Ok(default)
        }
    }
}

fn bool_or(config: &Config, path: &[&str], default: bool) -> bool {
    match config.get_value(path) {
        Ok(Value::Bool(b)) => b,
        Ok(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

impl MonitorConfigExt for Config {
    fn get_monitor_streams_interval(&self) -> Result<Duration> {
        duration_ms_or_persist(self, STREAMS_INTERVAL_MS, DEFAULT_STREAMS_INTERVAL)
    }

    fn set_monitor_streams_interval(&self, interval: Duration) -> Result<()> {
        self.set_value(STREAMS_INTERVAL_MS, u64_value(interval.as_millis() as u64))
    }

    fn get_monitor_analytics_interval(&self) -> Result<Duration> {
        duration_ms_or_persist(self, ANALYTICS_INTERVAL_MS, DEFAULT_ANALYTICS_INTERVAL)
    }

    fn set_monitor_analytics_interval(&self, interval: Duration) -> Result<()> {
        self.set_value(ANALYTICS_INTERVAL_MS, u64_value(interval.as_millis() as u64))
    }

    fn get_monitor_analytics_max_streams(&self) -> Result<usize> {
        match value_as_u64(self.get_value(ANALYTICS_MAX_STREAMS).ok()) {
            Some(max) => Ok(max as usize),
            None => {
                self.set_monitor_analytics_max_streams(DEFAULT_ANALYTICS_MAX_STREAMS)?;
                Ok(DEFAULT_ANALYTICS_MAX_STREAMS)
            }
        }
    }

    fn set_monitor_analytics_max_streams(&self, max: usize) -> Result<()> {
        self.set_value(ANALYTICS_MAX_STREAMS, u64_value(max as u64))
    }

    fn get_monitor_visibility_policy(&self) -> Result<VisibilityPolicy> {
        let defaults = VisibilityPolicy::default();

        let order_name = self.get_string_or(ORDER, defaults.order.as_str());
        let order = order_name.parse::<TileOrder>().unwrap_or_else(|err| {
            warn!("{}, using {}", err, defaults.order);
            defaults.order
        });

        let recent_window = value_as_u64(self.get_value(RECENT_WINDOW_SECS).ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let max_tiles = match value_as_u64(self.get_value(MAX_TILES).ok()) {
            Some(0) => None,
            Some(max) => Some(max as usize),
            None => defaults.max_tiles,
        };

        Ok(VisibilityPolicy {
            hide_pending: bool_or(self, HIDE_PENDING, defaults.hide_pending),
            live_only: bool_or(self, LIVE_ONLY, defaults.live_only),
            recent_window,
            order,
            max_tiles,
        })
    }

    fn set_monitor_visibility_policy(&self, policy: &VisibilityPolicy) -> Result<()> {
        self.set_value(HIDE_PENDING, Value::Bool(policy.hide_pending))?;
        self.set_value(LIVE_ONLY, Value::Bool(policy.live_only))?;
        self.set_value(
            RECENT_WINDOW_SECS,
            u64_value(policy.recent_window.map_or(0, |w| w.as_secs())),
        )?;
        self.set_string(ORDER, policy.order.as_str())?;
        self.set_value(MAX_TILES, u64_value(policy.max_tiles.unwrap_or(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        (dir, config)
    }

    #[test]
    fn defaults_match_the_dashboard() {
        let (_dir, config) = temp_config();
        assert_eq!(
            config.get_monitor_streams_interval().unwrap(),
            Duration::from_secs(8)
        );
        assert_eq!(
            config.get_monitor_analytics_interval().unwrap(),
            Duration::from_secs(15)
        );
        assert_eq!(config.get_monitor_analytics_max_streams().unwrap(), 6);
        assert_eq!(
            config.get_monitor_visibility_policy().unwrap(),
            VisibilityPolicy::default()
        );
    }

    #[test]
    fn visibility_policy_round_trips_through_config() {
        let (_dir, config) = temp_config();
        let policy = VisibilityPolicy {
            hide_pending: false,
            live_only: true,
            recent_window: Some(Duration::from_secs(3600)),
            order: TileOrder::LiveFirst,
            max_tiles: None,
        };
        config.set_monitor_visibility_policy(&policy).unwrap();
        assert_eq!(config.get_monitor_visibility_policy().unwrap(), policy);
    }

    #[test]
    fn unknown_order_falls_back_to_default() {
        let (_dir, config) = temp_config();
        config.set_string(ORDER, "alphabetical").unwrap();
        assert_eq!(
            config.get_monitor_visibility_policy().unwrap().order,
            TileOrder::Newest
        );
    }
}
