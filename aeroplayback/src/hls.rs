//! Headless HLS engine.
//!
//! The engine polls a media playlist, downloads the segments it has not
//! delivered yet and hands their bytes to the surface. It does not decode
//! anything: the point is to follow a playlist exactly like a player would
//! (live edge, buffer limits, end of stream) and to report the same events.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use m3u8_rs::{MediaPlaylist, Playlist};
use reqwest::Client;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::engine::{EngineEvent, EngineEvents, EngineFactory, MediaEngine};
use crate::error::{PlaybackError, Result};
use crate::source::EngineProfile;
use crate::surface::PlaybackSurface;

/// Default number of consecutive playlist failures before the error is fatal
pub const DEFAULT_MANIFEST_RETRIES: u32 = 3;

/// Default timeout of one playlist or segment request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest `#EXTINF` taken at face value; larger or unreadable durations are
/// clamped to this.
pub const MAX_SEGMENT_DURATION: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HlsSettings {
    /// Consecutive playlist load failures tolerated before a fatal error.
    pub manifest_retries: u32,
    pub retry_delay: Duration,
    /// Lower bound between two playlist refreshes.
    pub min_refresh: Duration,
    /// A request still pending after this counts as failed.
    pub request_timeout: Duration,
}

impl Default for HlsSettings {
    fn default() -> Self {
        Self {
            manifest_retries: DEFAULT_MANIFEST_RETRIES,
            retry_delay: Duration::from_secs(1),
            min_refresh: Duration::from_secs(1),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HlsEngineFactory {
    client: Client,
    settings: HlsSettings,
}

impl HlsEngineFactory {
    pub fn new(client: Client) -> Self {
        Self::with_settings(client, HlsSettings::default())
    }

    pub fn with_settings(client: Client, settings: HlsSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &HlsSettings {
        &self.settings
    }
}

impl EngineFactory for HlsEngineFactory {
    fn create(&self, profile: &EngineProfile, events: EngineEvents) -> Result<Box<dyn MediaEngine>> {
        Ok(Box::new(HlsEngine::new(
            self.client.clone(),
            profile.clone(),
            self.settings.clone(),
            events,
        )))
    }
}

pub struct HlsEngine {
    client: Client,
    profile: EngineProfile,
    settings: HlsSettings,
    events: EngineEvents,
    source: Option<Url>,
    surface: Option<Arc<dyn PlaybackSurface>>,
    loader: Option<LoaderHandle>,
    destroyed: bool,
}

struct LoaderHandle {
    cancel: CancellationToken,
    rewind: Arc<Notify>,
}

impl HlsEngine {
    pub fn new(client: Client, profile: EngineProfile, settings: HlsSettings, events: EngineEvents) -> Self {
        Self {
            client,
            profile,
            settings,
            events,
            source: None,
            surface: None,
            loader: None,
            destroyed: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_some()
    }
}

impl MediaEngine for HlsEngine {
    fn load_source(&mut self, url: &Url) -> Result<()> {
        if self.destroyed {
            return Err(PlaybackError::engine("engine destroyed"));
        }
        self.stop_load();
        self.source = Some(url.clone());
        Ok(())
    }

    fn attach_surface(&mut self, surface: Arc<dyn PlaybackSurface>) -> Result<()> {
        if self.destroyed {
            return Err(PlaybackError::engine("engine destroyed"));
        }
        if !surface.is_attached() {
            return Err(PlaybackError::SurfaceDetached);
        }
        self.surface = Some(surface);
        Ok(())
    }

    fn start_load(&mut self) -> Result<()> {
        if self.destroyed {
            return Err(PlaybackError::engine("engine destroyed"));
        }
        if self.loader.is_some() {
            return Ok(());
        }
        let url = self
            .source
            .clone()
            .ok_or_else(|| PlaybackError::engine("no source loaded"))?;
        let surface = self.surface.clone().ok_or(PlaybackError::SurfaceDetached)?;
        let runtime = Handle::try_current().map_err(|_| PlaybackError::NoRuntime)?;

        let cancel = CancellationToken::new();
        let rewind = Arc::new(Notify::new());
        let loader = PlaylistLoader {
            client: self.client.clone(),
            url,
            profile: self.profile.clone(),
            settings: self.settings.clone(),
            events: self.events.clone(),
            surface,
            cancel: cancel.clone(),
            rewind: rewind.clone(),
        };
        runtime.spawn(loader.run());

        self.loader = Some(LoaderHandle { cancel, rewind });
        Ok(())
    }

    fn stop_load(&mut self) {
        if let Some(loader) = self.loader.take() {
            loader.cancel.cancel();
        }
    }

    fn rewind(&mut self) {
        if let Some(loader) = &self.loader {
            loader.rewind.notify_one();
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.stop_load();
        self.surface = None;
        self.source = None;
        self.destroyed = true;
        trace!(generation = self.events.generation(), "HLS engine destroyed");
    }
}

impl Drop for HlsEngine {
    fn drop(&mut self) {
        self.stop_load();
    }
}

/// Outcome of one pass over a media playlist.
enum Pass {
    /// More segments may appear; refresh after the given delay.
    Refresh(Duration),
    /// The playlist is finished and everything was delivered.
    Ended,
}

struct PlaylistLoader {
    client: Client,
    url: Url,
    profile: EngineProfile,
    settings: HlsSettings,
    events: EngineEvents,
    surface: Arc<dyn PlaybackSurface>,
    cancel: CancellationToken,
    rewind: Arc<Notify>,
}

impl PlaylistLoader {
    async fn run(self) {
        let generation = self.events.generation();
        let mut media_url: Option<Url> = None;
        let mut next_sequence: Option<u64> = None;
        let mut failures = 0u32;
        let mut manifest_announced = false;

        debug!(generation, url = %self.url, kind = %self.profile.kind, "HLS loader started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let playlist_url = media_url.clone().unwrap_or_else(|| self.url.clone());
            let playlist = tokio::select! {
                _ = self.cancel.cancelled() => break,
                playlist = self.fetch_playlist(&playlist_url) => playlist,
            };

            let media = match playlist {
                Ok(Playlist::MasterPlaylist(master)) => {
                    match master.variants.first().map(|v| playlist_url.join(&v.uri)) {
                        Some(Ok(variant)) => {
                            debug!(generation, %variant, "Master playlist, following first variant");
                            media_url = Some(variant);
                            continue;
                        }
                        Some(Err(err)) => Err(PlaybackError::Playlist(format!("invalid variant URI: {}", err))),
                        None => Err(PlaybackError::Playlist("master playlist without variants".to_string())),
                    }
                }
                Ok(Playlist::MediaPlaylist(media)) => Ok(media),
                Err(err) => Err(err),
            };

            let media = match media {
                Ok(media) => media,
                Err(err) => {
                    failures += 1;
                    if failures >= self.settings.manifest_retries.max(1) {
                        warn!(generation, url = %playlist_url, failures, "Playlist unavailable, giving up: {}", err);
                        self.emit(EngineEvent::fatal(format!("manifestLoadError: {}", err)));
                        break;
                    }
                    debug!(generation, url = %playlist_url, failures, "Playlist load failed: {}", err);
                    self.emit(EngineEvent::non_fatal(format!("manifestLoadError: {}", err)));
                    if self.wait(self.settings.retry_delay).await.is_none() {
                        break;
                    }
                    continue;
                }
            };

            failures = 0;
            if !manifest_announced {
                manifest_announced = true;
                self.emit(EngineEvent::ManifestParsed);
            }

            let pass = tokio::select! {
                _ = self.cancel.cancelled() => break,
                pass = self.deliver(&playlist_url, &media, &mut next_sequence) => pass,
            };

            match pass {
                Pass::Refresh(delay) => match self.wait(delay).await {
                    None => break,
                    Some(true) => next_sequence = None,
                    Some(false) => {}
                },
                Pass::Ended => {
                    self.emit(EngineEvent::BufferEos);
                    // Nothing left to fetch until rewound
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = self.rewind.notified() => {
                            trace!(generation, "Rewinding to the first segment");
                            next_sequence = None;
                        }
                    }
                }
            }
        }

        debug!(generation, "HLS loader stopped");
    }

    /// Sleeps for `delay`. `None` when cancelled, `Some(true)` when a rewind
    /// was requested meanwhile.
    async fn wait(&self, delay: Duration) -> Option<bool> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            _ = self.rewind.notified() => Some(true),
            _ = tokio::time::sleep(delay) => Some(false),
        }
    }

    fn emit(&self, event: EngineEvent) {
        if !self.cancel.is_cancelled() {
            self.events.emit(event);
        }
    }

    async fn fetch(&self, url: &Url) -> Result<Bytes> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.settings.request_timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    }

    async fn fetch_playlist(&self, url: &Url) -> Result<Playlist> {
        let body = self.fetch(url).await?;
        m3u8_rs::parse_playlist_res(&body)
            .map_err(|e| PlaybackError::Playlist(format!("unparsable playlist: {:?}", e)))
    }

    /// Delivers up to `max_buffer` worth of new segments.
    async fn deliver(&self, playlist_url: &Url, media: &MediaPlaylist, next_sequence: &mut Option<u64>) -> Pass {
        let first = media.media_sequence;
        let end = first + media.segments.len() as u64;

        let start = match *next_sequence {
            Some(seq) if (first..=end).contains(&seq) => seq,
            // Fell out of the live window, sequence restarted, or first pass
            _ => {
                let skip = match self.profile.live_sync_segments {
                    Some(n) if !media.end_list => media.segments.len().saturating_sub(n as usize),
                    _ => 0,
                };
                first + skip as u64
            }
        };

        let mut sequence = start;
        let mut buffered = Duration::ZERO;
        let mut last_duration = Duration::ZERO;

        while sequence < end && (sequence == start || buffered < self.profile.max_buffer) {
            let segment = &media.segments[(sequence - first) as usize];
            let duration = segment_duration(segment.duration);

            match playlist_url.join(&segment.uri) {
                Ok(segment_url) => match self.fetch(&segment_url).await {
                    Ok(bytes) => {
                        self.surface.render(sequence, &bytes);
                        self.emit(EngineEvent::FragmentLoaded { sequence });
                    }
                    Err(err) => {
                        self.emit(EngineEvent::non_fatal(format!("fragLoadError: {}", err)));
                    }
                },
                Err(err) => {
                    self.emit(EngineEvent::non_fatal(format!("invalid segment URI: {}", err)));
                }
            }

            buffered += duration;
            last_duration = duration;
            sequence += 1;
        }

        *next_sequence = Some(sequence);

        if media.end_list && sequence >= end {
            Pass::Ended
        } else {
            Pass::Refresh(last_duration.max(self.settings.min_refresh))
        }
    }
}

/// `#EXTINF` value as a duration; negative, non-finite or oversized values
/// are clamped.
fn segment_duration(seconds: f32) -> Duration {
    match Duration::try_from_secs_f32(seconds) {
        Ok(duration) => duration.min(MAX_SEGMENT_DURATION),
        Err(_) if seconds < 0.0 => Duration::ZERO,
        Err(_) => MAX_SEGMENT_DURATION,
    }
}
