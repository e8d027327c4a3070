//! Playback sources and the engine tuning attached to each of them.

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{PlaybackError, Result};

/// Placeholder substituted by [`ReplayUrlPolicy::Template`]
pub const STREAM_KEY_PLACEHOLDER: &str = "{streamKey}";

/// Which of the two playlists a session is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SourceKind {
    /// Low-latency playlist fed by the RTMP ingest.
    #[default]
    Live,
    /// Looping window served by the replay VM.
    Replay,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Live => "LIVE",
            SourceKind::Replay => "REPLAY",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackSource {
    pub kind: SourceKind,
    pub url: String,
}

impl PlaybackSource {
    pub fn new(kind: SourceKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
        }
    }

    pub fn live(url: impl Into<String>) -> Self {
        Self::new(SourceKind::Live, url)
    }

    pub fn replay(url: impl Into<String>) -> Self {
        Self::new(SourceKind::Replay, url)
    }

    /// Parses the URL, accepting only absolute http(s) URLs.
    pub fn validate(&self) -> Result<Url> {
        let raw = self.url.trim();
        if raw.is_empty() {
            return Err(PlaybackError::invalid_source(raw, "empty URL"));
        }
        let url = Url::parse(raw).map_err(|e| PlaybackError::invalid_source(raw, e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(PlaybackError::invalid_source(
                raw,
                format!("unsupported scheme '{}'", other),
            )),
        }
    }
}

/// Engine tuning for one source kind.
///
/// The two profiles are fixed: LIVE favours latency, REPLAY favours
/// smoothness and loops when the window ends.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineProfile {
    pub kind: SourceKind,
    pub low_latency: bool,
    /// Start this many segments behind the live edge.
    pub live_sync_segments: Option<u32>,
    pub back_buffer: Duration,
    pub max_buffer: Duration,
    pub loop_on_end: bool,
}

impl EngineProfile {
    pub const LIVE: EngineProfile = EngineProfile {
        kind: SourceKind::Live,
        low_latency: true,
        live_sync_segments: Some(1),
        back_buffer: Duration::from_secs(0),
        max_buffer: Duration::from_secs(5),
        loop_on_end: false,
    };

    pub const REPLAY: EngineProfile = EngineProfile {
        kind: SourceKind::Replay,
        low_latency: false,
        live_sync_segments: None,
        back_buffer: Duration::from_secs(30),
        max_buffer: Duration::from_secs(30),
        loop_on_end: true,
    };

    pub fn for_kind(kind: SourceKind) -> &'static EngineProfile {
        match kind {
            SourceKind::Live => &Self::LIVE,
            SourceKind::Replay => &Self::REPLAY,
        }
    }
}

/// How the REPLAY URL of a stream is derived.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ReplayUrlPolicy {
    /// The replay VM serves its looping window on the live playlist URL.
    #[default]
    SameAsLive,
    /// URL template where `{streamKey}` is replaced by the stream key.
    Template(String),
}

impl ReplayUrlPolicy {
    /// An empty template means [`ReplayUrlPolicy::SameAsLive`].
    pub fn from_template(template: &str) -> Self {
        let template = template.trim();
        if template.is_empty() {
            ReplayUrlPolicy::SameAsLive
        } else {
            ReplayUrlPolicy::Template(template.to_string())
        }
    }

    pub fn replay_url(&self, live_url: &str, stream_key: &str) -> String {
        match self {
            ReplayUrlPolicy::SameAsLive => live_url.to_string(),
            ReplayUrlPolicy::Template(template) => {
                template.replace(STREAM_KEY_PLACEHOLDER, stream_key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_match_source_kind() {
        let live = EngineProfile::for_kind(SourceKind::Live);
        assert!(live.low_latency);
        assert_eq!(live.live_sync_segments, Some(1));
        assert_eq!(live.back_buffer, Duration::ZERO);
        assert_eq!(live.max_buffer, Duration::from_secs(5));
        assert!(!live.loop_on_end);

        let replay = EngineProfile::for_kind(SourceKind::Replay);
        assert!(!replay.low_latency);
        assert_eq!(replay.live_sync_segments, None);
        assert_eq!(replay.back_buffer, Duration::from_secs(30));
        assert_eq!(replay.max_buffer, Duration::from_secs(30));
        assert!(replay.loop_on_end);
    }

    #[test]
    fn validate_rejects_bad_urls() {
        assert!(PlaybackSource::live("http://cdn.local/hls/a.m3u8").validate().is_ok());
        assert!(matches!(
            PlaybackSource::live("  ").validate(),
            Err(PlaybackError::InvalidSource { .. })
        ));
        assert!(PlaybackSource::replay("/hls/a.m3u8").validate().is_err());
        assert!(PlaybackSource::replay("rtmp://ingest/live/a").validate().is_err());
    }

    #[test]
    fn replay_url_policy() {
        let live = "http://34.93.1.2/hls/EVT-1.m3u8";
        assert_eq!(ReplayUrlPolicy::from_template(""), ReplayUrlPolicy::SameAsLive);
        assert_eq!(ReplayUrlPolicy::SameAsLive.replay_url(live, "EVT-1"), live);

        let policy = ReplayUrlPolicy::from_template("http://replay.local/{streamKey}/index.m3u8");
        assert_eq!(
            policy.replay_url(live, "EVT-1"),
            "http://replay.local/EVT-1/index.m3u8"
        );
    }
}
