//! Which streams get a tile, and in which order

use crate::models::{Stream, StreamStatus, ALL_PLACES};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default number of tiles on the wall (3x3 grid)
pub const DEFAULT_MAX_TILES: usize = 9;

/// Tile ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileOrder {
    /// Keep the registry's order
    Registry,
    /// Most recently created first
    #[default]
    Newest,
    /// LIVE streams first, newest first within each group
    LiveFirst,
}

impl TileOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileOrder::Registry => "registry",
            TileOrder::Newest => "newest",
            TileOrder::LiveFirst => "live_first",
        }
    }
}

impl fmt::Display for TileOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TileOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "registry" => Ok(TileOrder::Registry),
            "newest" => Ok(TileOrder::Newest),
            "live_first" => Ok(TileOrder::LiveFirst),
            other => Err(format!("Unknown tile order: {}", other)),
        }
    }
}

/// Filtering and ordering rules applied to the registry list before it
/// reaches the video wall
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityPolicy {
    /// Hide streams that never started publishing
    pub hide_pending: bool,
    /// Only show LIVE streams
    pub live_only: bool,
    /// Hide streams created longer ago than this. Streams without a
    /// creation time are kept.
    pub recent_window: Option<Duration>,
    pub order: TileOrder,
    /// `None` shows every stream
    pub max_tiles: Option<usize>,
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self {
            hide_pending: true,
            live_only: false,
            recent_window: None,
            order: TileOrder::Newest,
            max_tiles: Some(DEFAULT_MAX_TILES),
        }
    }
}

impl VisibilityPolicy {
    /// Policy that keeps everything in registry order
    pub fn show_all() -> Self {
        Self {
            hide_pending: false,
            live_only: false,
            recent_window: None,
            order: TileOrder::Registry,
            max_tiles: None,
        }
    }

    /// Applies the policy; `now_ms` is the current epoch time in milliseconds
    pub fn apply(&self, streams: &[Stream], now_ms: i64) -> Vec<Stream> {
        let oldest = self
            .recent_window
            .map(|window| now_ms.saturating_sub(i64::try_from(window.as_millis()).unwrap_or(i64::MAX)));

        let mut visible: Vec<Stream> = streams
            .iter()
            .filter(|s| !(self.hide_pending && s.status == StreamStatus::Pending))
            .filter(|s| !self.live_only || s.is_live())
            .filter(|s| match (oldest, s.created_at) {
                (Some(limit), Some(created)) => created >= limit,
                _ => true,
            })
            .cloned()
            .collect();

        // Stable sorts: ties keep the registry order
        match self.order {
            TileOrder::Registry => {}
            TileOrder::Newest => {
                visible.sort_by_key(|s| std::cmp::Reverse(s.created_at.unwrap_or(i64::MIN)));
            }
            TileOrder::LiveFirst => {
                visible.sort_by_key(|s| {
                    (
                        !s.is_live(),
                        std::cmp::Reverse(s.created_at.unwrap_or(i64::MIN)),
                    )
                });
            }
        }

        if let Some(max) = self.max_tiles {
            visible.truncate(max);
        }
        visible
    }
}

/// Place selector entries: `ALL` followed by the sorted unique places
pub fn places(streams: &[Stream]) -> Vec<String> {
    let unique: BTreeSet<&str> = streams
        .iter()
        .map(|s| s.place.trim())
        .filter(|p| !p.is_empty())
        .collect();

    std::iter::once(ALL_PLACES.to_string())
        .chain(unique.into_iter().map(str::to_string))
        .collect()
}

/// Streams flying over `place`; `ALL` keeps every stream
pub fn filter_by_place(streams: &[Stream], place: &str) -> Vec<Stream> {
    let place = place.trim();
    if place == ALL_PLACES {
        return streams.to_vec();
    }
    streams
        .iter()
        .filter(|s| s.place.trim() == place)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(key: &str, status: StreamStatus, created_at: Option<i64>, place: &str) -> Stream {
        Stream {
            id: key.to_lowercase(),
            pilot_name: "Pilot".into(),
            place: place.into(),
            stream_key: key.into(),
            rtmp_url: format!("rtmp://ingest/live/{}", key),
            hls_url: format!("http://ingest/hls/{}.m3u8", key),
            status,
            created_at,
            started_at: None,
            ended_at: None,
            lat: None,
            lon: None,
        }
    }

    fn keys(streams: &[Stream]) -> Vec<&str> {
        streams.iter().map(|s| s.stream_key.as_str()).collect()
    }

    #[test]
    fn test_default_policy_hides_pending_and_sorts_newest() {
        let streams = vec![
            stream("A", StreamStatus::Live, Some(1_000), "Gate"),
            stream("B", StreamStatus::Pending, Some(5_000), "Gate"),
            stream("C", StreamStatus::Ended, Some(3_000), "Hall"),
            stream("D", StreamStatus::Live, None, "Hall"),
        ];
        let visible = VisibilityPolicy::default().apply(&streams, 10_000);
        assert_eq!(keys(&visible), vec!["C", "A", "D"]);
    }

    #[test]
    fn test_max_tiles_truncates() {
        let streams: Vec<Stream> = (0..12)
            .map(|i| stream(&format!("S{}", i), StreamStatus::Live, Some(i), "Gate"))
            .collect();
        let visible = VisibilityPolicy::default().apply(&streams, 100);
        assert_eq!(visible.len(), DEFAULT_MAX_TILES);
        assert_eq!(visible[0].stream_key, "S11");

        let all = VisibilityPolicy::show_all().apply(&streams, 100);
        assert_eq!(all.len(), 12);
        assert_eq!(all[0].stream_key, "S0");
    }

    #[test]
    fn test_live_first_and_live_only() {
        let streams = vec![
            stream("OLD-LIVE", StreamStatus::Live, Some(1), "Gate"),
            stream("NEW-ENDED", StreamStatus::Ended, Some(9), "Gate"),
            stream("NEW-LIVE", StreamStatus::Live, Some(5), "Gate"),
        ];
        let policy = VisibilityPolicy {
            order: TileOrder::LiveFirst,
            ..VisibilityPolicy::default()
        };
        assert_eq!(
            keys(&policy.apply(&streams, 10)),
            vec!["NEW-LIVE", "OLD-LIVE", "NEW-ENDED"]
        );

        let policy = VisibilityPolicy {
            live_only: true,
            order: TileOrder::Registry,
            ..VisibilityPolicy::default()
        };
        assert_eq!(keys(&policy.apply(&streams, 10)), vec!["OLD-LIVE", "NEW-LIVE"]);
    }

    #[test]
    fn test_recent_window() {
        let streams = vec![
            stream("STALE", StreamStatus::Ended, Some(0), "Gate"),
            stream("FRESH", StreamStatus::Live, Some(50_000), "Gate"),
            stream("UNDATED", StreamStatus::Live, None, "Gate"),
        ];
        let policy = VisibilityPolicy {
            recent_window: Some(Duration::from_secs(30)),
            order: TileOrder::Registry,
            ..VisibilityPolicy::default()
        };
        assert_eq!(keys(&policy.apply(&streams, 60_000)), vec!["FRESH", "UNDATED"]);
    }

    #[test]
    fn test_huge_recent_window_keeps_everything() {
        let streams = vec![
            stream("ANCIENT", StreamStatus::Ended, Some(0), "Gate"),
            stream("FRESH", StreamStatus::Live, Some(50_000), "Gate"),
        ];
        let policy = VisibilityPolicy {
            recent_window: Some(Duration::MAX),
            order: TileOrder::Registry,
            ..VisibilityPolicy::default()
        };
        assert_eq!(keys(&policy.apply(&streams, 60_000)), vec!["ANCIENT", "FRESH"]);
    }

    #[test]
    fn test_tile_order_parsing() {
        assert_eq!("newest".parse::<TileOrder>().unwrap(), TileOrder::Newest);
        assert_eq!("Live-First".parse::<TileOrder>().unwrap(), TileOrder::LiveFirst);
        assert_eq!(" registry ".parse::<TileOrder>().unwrap(), TileOrder::Registry);
        assert!("random".parse::<TileOrder>().is_err());
    }

    #[test]
    fn test_places_and_filter() {
        let streams = vec![
            stream("A", StreamStatus::Live, None, "North Gate"),
            stream("B", StreamStatus::Live, None, " East Hall "),
            stream("C", StreamStatus::Live, None, "North Gate"),
            stream("D", StreamStatus::Live, None, ""),
        ];
        assert_eq!(places(&streams), vec!["ALL", "East Hall", "North Gate"]);
        assert_eq!(keys(&filter_by_place(&streams, "North Gate")), vec!["A", "C"]);
        assert_eq!(keys(&filter_by_place(&streams, "East Hall")), vec!["B"]);
        assert_eq!(filter_by_place(&streams, ALL_PLACES).len(), 4);
    }
}
