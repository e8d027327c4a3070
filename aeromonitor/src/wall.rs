//! The video wall: one playback session per visible stream.
//!
//! [`VideoWall::reconcile`] is called with every new stream list. Tiles are
//! keyed by stream key: new keys are mounted, vanished keys unmounted, and a
//! tile whose playback URL changed is remounted from scratch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use aerofeeds::Stream;
use aeroplayback::{
    EngineFactory, HeadlessSurface, LiveProbe, PlaybackError, PlaybackSession, ReplayUrlPolicy,
    SessionHandle, SessionSpec, SourceKind,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::status::StatusPill;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileStatus {
    pub stream_key: String,
    pub pilot: String,
    pub place: String,
    pub source: SourceKind,
    pub pill: StatusPill,
    pub session_id: Uuid,
    /// Fragments rendered so far on this tile.
    pub fragments: u64,
}

/// What a reconcile pass changed, by stream key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WallChanges {
    pub mounted: Vec<String>,
    pub unmounted: Vec<String>,
    pub remounted: Vec<String>,
    pub failed: Vec<String>,
}

impl WallChanges {
    pub fn is_empty(&self) -> bool {
        self.mounted.is_empty()
            && self.unmounted.is_empty()
            && self.remounted.is_empty()
            && self.failed.is_empty()
    }
}

struct Tile {
    stream: Stream,
    playback_url: String,
    surface: Arc<HeadlessSurface>,
    session: SessionHandle,
}

pub struct VideoWall {
    factory: Arc<dyn EngineFactory>,
    probe: Arc<dyn LiveProbe>,
    replay_policy: ReplayUrlPolicy,
    probe_interval: Duration,
    hls_proxy_base: Option<String>,
    tiles: Vec<Tile>,
}

impl VideoWall {
    pub fn new(factory: Arc<dyn EngineFactory>, probe: Arc<dyn LiveProbe>) -> Self {
        Self {
            factory,
            probe,
            replay_policy: ReplayUrlPolicy::default(),
            probe_interval: aeroplayback::session::DEFAULT_PROBE_INTERVAL,
            hls_proxy_base: None,
            tiles: Vec::new(),
        }
    }

    pub fn with_replay_policy(mut self, policy: ReplayUrlPolicy) -> Self {
        self.replay_policy = policy;
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn with_hls_proxy_base(mut self, base: Option<String>) -> Self {
        self.hls_proxy_base = base;
        self
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn stream_keys(&self) -> Vec<&str> {
        self.tiles.iter().map(|t| t.stream.stream_key.as_str()).collect()
    }

    pub async fn reconcile(&mut self, streams: &[Stream]) -> WallChanges {
        let mut changes = WallChanges::default();
        let wanted: HashSet<&str> = streams.iter().map(|s| s.stream_key.as_str()).collect();

        let (mut kept, gone): (Vec<Tile>, Vec<Tile>) = std::mem::take(&mut self.tiles)
            .into_iter()
            .partition(|t| wanted.contains(t.stream.stream_key.as_str()));

        for tile in gone {
            changes.unmounted.push(tile.stream.stream_key.clone());
            Self::unmount(tile).await;
        }

        let mut next: Vec<Tile> = Vec::with_capacity(streams.len());
        for stream in streams {
            let key = stream.stream_key.as_str();
            if next.iter().any(|t| t.stream.stream_key == key) {
                continue;
            }
            let playback_url = stream.playback_url(self.hls_proxy_base.as_deref());

            let existing = kept
                .iter()
                .position(|t| t.stream.stream_key == key)
                .map(|idx| kept.swap_remove(idx));

            match existing {
                Some(mut tile) if tile.playback_url == playback_url => {
                    tile.stream = stream.clone();
                    next.push(tile);
                }
                Some(tile) => {
                    debug!(stream_key = %key, from = %tile.playback_url, to = %playback_url, "Playback URL changed");
                    Self::unmount(tile).await;
                    match self.mount(stream, playback_url) {
                        Ok(tile) => {
                            changes.remounted.push(key.to_string());
                            next.push(tile);
                        }
                        Err(err) => {
                            warn!(stream_key = %key, "Failed to remount tile: {}", err);
                            changes.failed.push(key.to_string());
                        }
                    }
                }
                None => match self.mount(stream, playback_url) {
                    Ok(tile) => {
                        changes.mounted.push(key.to_string());
                        next.push(tile);
                    }
                    Err(err) => {
                        warn!(stream_key = %key, "Failed to mount tile: {}", err);
                        changes.failed.push(key.to_string());
                    }
                },
            }
        }

        self.tiles = next;
        if !changes.is_empty() {
            info!(
                mounted = changes.mounted.len(),
                unmounted = changes.unmounted.len(),
                remounted = changes.remounted.len(),
                failed = changes.failed.len(),
                tiles = self.tiles.len(),
                "Video wall updated"
            );
        }
        changes
    }

    pub fn statuses(&self) -> Vec<TileStatus> {
        self.tiles
            .iter()
            .map(|tile| {
                let source = tile.session.current_source();
                TileStatus {
                    stream_key: tile.stream.stream_key.clone(),
                    pilot: tile.stream.display_pilot().to_string(),
                    place: tile.stream.display_place(),
                    source,
                    pill: StatusPill::resolve(source, tile.stream.status),
                    session_id: tile.session.id(),
                    fragments: tile.surface.stats().fragments,
                }
            })
            .collect()
    }

    /// Unmounts every tile.
    pub async fn clear(&mut self) {
        for tile in std::mem::take(&mut self.tiles) {
            Self::unmount(tile).await;
        }
    }

    fn mount(&self, stream: &Stream, playback_url: String) -> Result<Tile, PlaybackError> {
        let spec = SessionSpec::new(stream.stream_key.clone(), playback_url.clone(), &self.replay_policy)
            .with_probe_interval(self.probe_interval);
        let surface = Arc::new(HeadlessSurface::new());
        let session = PlaybackSession::mount(
            spec,
            self.factory.clone(),
            surface.clone(),
            self.probe.clone(),
        )?;
        debug!(stream_key = %stream.stream_key, session = %session.id(), "Tile mounted");

        Ok(Tile {
            stream: stream.clone(),
            playback_url,
            surface,
            session,
        })
    }

    async fn unmount(tile: Tile) {
        tile.surface.detach();
        match tile.session.unmount().await {
            Ok(report) => debug!(
                stream_key = %report.stream_key,
                failovers = report.stats.failovers,
                recoveries = report.stats.recoveries,
                probes = report.probes,
                "Tile unmounted"
            ),
            Err(err) => warn!(stream_key = %tile.stream.stream_key, "Tile session ended abnormally: {}", err),
        }
    }
}
