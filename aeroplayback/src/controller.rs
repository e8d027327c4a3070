//! Live/replay resilience state machine for one playback surface.
//!
//! The controller starts on the LIVE playlist. A fatal engine error moves it
//! to the REPLAY playlist; a successful probe of the LIVE playlist brings it
//! back. Every switch destroys the current engine before the next one is
//! built, so a surface never has more than one engine attached.
//!
//! The controller itself is synchronous and does no timing: the session
//! driver feeds it engine events and probe results one at a time.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::engine::{
    EngineEvent, EngineEvents, EngineFactory, EngineGuard, EngineLedger, LedgerSnapshot,
    TaggedEvent,
};
use crate::error::{PlaybackError, Result};
use crate::source::{EngineProfile, PlaybackSource, SourceKind};
use crate::surface::PlaybackSurface;

/// State change reported back to the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// LIVE failed fatally, REPLAY attached.
    FailedOver,
    /// LIVE probe succeeded, LIVE attached again.
    Recovered,
    /// REPLAY reached its end and restarted from the beginning.
    Looped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub failovers: u64,
    pub recoveries: u64,
    pub loops: u64,
    pub attach_failures: u64,
    /// Fatal errors received while already on REPLAY.
    pub replay_fatal_errors: u64,
    /// Events dropped because their engine was already destroyed.
    pub stale_events: u64,
}

pub struct ResilienceController {
    stream_key: String,
    live_url: String,
    replay_url: String,
    state: SourceKind,
    factory: Arc<dyn EngineFactory>,
    surface: Arc<dyn PlaybackSurface>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    engine: Option<EngineGuard>,
    generation: u64,
    ledger: Arc<EngineLedger>,
    stats: ControllerStats,
    torn_down: bool,
}

impl ResilienceController {
    pub fn new(
        stream_key: impl Into<String>,
        live_url: impl Into<String>,
        replay_url: impl Into<String>,
        factory: Arc<dyn EngineFactory>,
        surface: Arc<dyn PlaybackSurface>,
        events_tx: mpsc::UnboundedSender<TaggedEvent>,
    ) -> Self {
        Self {
            stream_key: stream_key.into(),
            live_url: live_url.into(),
            replay_url: replay_url.into(),
            state: SourceKind::Live,
            factory,
            surface,
            events_tx,
            engine: None,
            generation: 0,
            ledger: Arc::new(EngineLedger::new()),
            stats: ControllerStats::default(),
            torn_down: false,
        }
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    pub fn state(&self) -> SourceKind {
        self.state
    }

    pub fn live_url(&self) -> &str {
        &self.live_url
    }

    pub fn replay_url(&self) -> &str {
        &self.replay_url
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    pub fn ledger(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    /// Generation of the most recent attach attempt.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// The LIVE playlist should be probed only while on REPLAY.
    pub fn needs_probe(&self) -> bool {
        !self.torn_down && self.state == SourceKind::Replay
    }

    /// Attaches the LIVE source. Returns false if the attach failed.
    pub fn start(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        self.attach(SourceKind::Live)
    }

    pub fn handle_engine_event(&mut self, generation: u64, event: EngineEvent) -> Option<Transition> {
        if self.torn_down || self.engine.is_none() || generation != self.generation {
            trace!(
                stream_key = %self.stream_key,
                generation,
                current = self.generation,
                ?event,
                "Ignoring event from a released engine"
            );
            self.stats.stale_events += 1;
            return None;
        }

        match event {
            EngineEvent::ManifestParsed | EngineEvent::FragmentLoaded { .. } => {
                self.surface.resume();
                None
            }
            EngineEvent::Error {
                fatal: false,
                details,
            } => {
                debug!(stream_key = %self.stream_key, source = %self.state, "Non-fatal engine error: {}", details);
                None
            }
            EngineEvent::Error {
                fatal: true,
                details,
            } => match self.state {
                SourceKind::Live => {
                    warn!(
                        stream_key = %self.stream_key,
                        "Fatal error on LIVE, switching to REPLAY: {}",
                        details
                    );
                    self.stats.failovers += 1;
                    self.attach(SourceKind::Replay);
                    Some(Transition::FailedOver)
                }
                SourceKind::Replay => {
                    warn!(
                        stream_key = %self.stream_key,
                        "Fatal error on REPLAY, staying on REPLAY: {}",
                        details
                    );
                    self.stats.replay_fatal_errors += 1;
                    None
                }
            },
            EngineEvent::BufferEos => {
                if self.state != SourceKind::Replay {
                    return None;
                }
                if let Some(guard) = self.engine.as_mut() {
                    guard.engine_mut().rewind();
                }
                self.surface.seek_to_start();
                self.surface.resume();
                self.stats.loops += 1;
                debug!(stream_key = %self.stream_key, loops = self.stats.loops, "Replay window ended, looping");
                Some(Transition::Looped)
            }
        }
    }

    /// Feeds the outcome of a LIVE probe.
    pub fn handle_probe_result(&mut self, reachable: bool) -> Option<Transition> {
        if !self.needs_probe() {
            return None;
        }
        if !reachable {
            trace!(stream_key = %self.stream_key, "LIVE still unreachable");
            return None;
        }

        info!(stream_key = %self.stream_key, "LIVE reachable again, switching back");
        self.stats.recoveries += 1;
        self.attach(SourceKind::Live);
        Some(Transition::Recovered)
    }

    /// Replaces both URLs and re-attaches the current source.
    pub fn update_sources(&mut self, live_url: impl Into<String>, replay_url: impl Into<String>) -> bool {
        self.live_url = live_url.into();
        self.replay_url = replay_url.into();
        if self.torn_down {
            return false;
        }
        let kind = self.state;
        self.attach(kind)
    }

    /// Destroys the engine and blanks the surface. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if let Some(guard) = self.engine.take() {
            guard.release();
        }
        self.surface.clear();
        debug!(stream_key = %self.stream_key, ledger = ?self.ledger.snapshot(), "Controller torn down");
    }

    fn source_url(&self, kind: SourceKind) -> &str {
        match kind {
            SourceKind::Live => &self.live_url,
            SourceKind::Replay => &self.replay_url,
        }
    }

    fn attach(&mut self, kind: SourceKind) -> bool {
        // The previous engine goes away before the next one exists
        if let Some(guard) = self.engine.take() {
            guard.release();
        }

        self.state = kind;
        self.generation += 1;

        match self.build_engine(kind, self.generation) {
            Ok(guard) => {
                debug!(
                    stream_key = %self.stream_key,
                    source = %kind,
                    generation = self.generation,
                    "Engine attached"
                );
                self.engine = Some(guard);
                true
            }
            Err(err) => {
                warn!(
                    stream_key = %self.stream_key,
                    source = %kind,
                    url = %self.source_url(kind),
                    "Failed to attach playback engine: {}",
                    err
                );
                self.stats.attach_failures += 1;
                self.surface.clear();
                false
            }
        }
    }

    fn build_engine(&self, kind: SourceKind, generation: u64) -> Result<EngineGuard> {
        let url = PlaybackSource::new(kind, self.source_url(kind)).validate()?;
        if !self.surface.is_attached() {
            return Err(PlaybackError::SurfaceDetached);
        }

        let events = EngineEvents::new(generation, self.events_tx.clone());
        let engine = self
            .factory
            .create(EngineProfile::for_kind(kind), events)?;
        let mut guard = EngineGuard::new(engine, generation, self.ledger.clone());

        let engine = guard.engine_mut();
        engine.load_source(&url)?;
        engine.attach_surface(self.surface.clone())?;
        engine.start_load()?;
        self.surface.resume();

        Ok(guard)
    }
}

impl Drop for ResilienceController {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::HeadlessSurface;
    use crate::testing::FakeEngineFactory;

    const LIVE: &str = "http://ingest.local/hls/EVT-1.m3u8";
    const REPLAY: &str = "http://replay.local/hls/EVT-1.m3u8";

    struct Fixture {
        controller: ResilienceController,
        factory: Arc<FakeEngineFactory>,
        surface: Arc<HeadlessSurface>,
        _events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    }

    fn fixture() -> Fixture {
        let factory = Arc::new(FakeEngineFactory::new());
        let surface = Arc::new(HeadlessSurface::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let controller = ResilienceController::new(
            "EVT-1",
            LIVE,
            REPLAY,
            factory.clone(),
            surface.clone(),
            events_tx,
        );
        Fixture {
            controller,
            factory,
            surface,
            _events_rx: events_rx,
        }
    }

    fn fatal() -> EngineEvent {
        EngineEvent::fatal("networkError: manifestLoadError")
    }

    #[test]
    fn start_attaches_live() {
        let mut f = fixture();
        assert!(f.controller.start());
        assert_eq!(f.controller.state(), SourceKind::Live);
        assert!(!f.controller.needs_probe());
        assert_eq!(f.factory.loaded_urls(), vec![LIVE.to_string()]);
        assert_eq!(f.factory.created_kinds(), vec![SourceKind::Live]);
        assert!(f.surface.stats().playing);
    }

    #[test]
    fn fatal_live_error_fails_over_once() {
        let mut f = fixture();
        f.controller.start();
        let gen = f.controller.generation();

        assert_eq!(
            f.controller.handle_engine_event(gen, fatal()),
            Some(Transition::FailedOver)
        );
        assert_eq!(f.controller.state(), SourceKind::Replay);
        assert!(f.controller.needs_probe());

        // Further fatal errors on REPLAY do not reattach
        let gen = f.controller.generation();
        for _ in 0..3 {
            assert_eq!(f.controller.handle_engine_event(gen, fatal()), None);
        }

        assert_eq!(
            f.factory.created_kinds(),
            vec![SourceKind::Live, SourceKind::Replay]
        );
        assert_eq!(f.factory.loaded_urls()[1], REPLAY);
        assert_eq!(f.controller.stats().failovers, 1);
        assert_eq!(f.controller.stats().replay_fatal_errors, 3);
    }

    #[test]
    fn never_more_than_one_engine() {
        let mut f = fixture();
        f.controller.start();
        for _ in 0..5 {
            let gen = f.controller.generation();
            f.controller.handle_engine_event(gen, fatal());
            f.controller.handle_probe_result(true);
        }
        f.controller.teardown();

        assert_eq!(f.factory.max_alive(), 1);
        assert_eq!(f.factory.alive(), 0);
        let ledger = f.controller.ledger();
        assert_eq!(ledger.constructed, 11);
        assert_eq!(ledger.destroyed, 11);
        assert_eq!(ledger.max_alive, 1);
    }

    #[test]
    fn stale_events_are_ignored() {
        let mut f = fixture();
        f.controller.start();
        let live_gen = f.controller.generation();
        f.controller.handle_engine_event(live_gen, fatal());

        // A late fatal error from the destroyed LIVE engine
        assert_eq!(f.controller.handle_engine_event(live_gen, fatal()), None);
        assert_eq!(f.controller.stats().stale_events, 1);
        assert_eq!(f.controller.stats().replay_fatal_errors, 0);
    }

    #[test]
    fn non_fatal_errors_are_absorbed() {
        let mut f = fixture();
        f.controller.start();
        let gen = f.controller.generation();
        assert_eq!(
            f.controller
                .handle_engine_event(gen, EngineEvent::non_fatal("fragLoadError")),
            None
        );
        assert_eq!(f.controller.state(), SourceKind::Live);
        assert_eq!(f.factory.created_kinds().len(), 1);
    }

    #[test]
    fn manifest_and_fragments_resume_playback() {
        let mut f = fixture();
        f.controller.start();
        let gen = f.controller.generation();
        let before = f.surface.stats().resumes;

        f.controller.handle_engine_event(gen, EngineEvent::ManifestParsed);
        f.controller
            .handle_engine_event(gen, EngineEvent::FragmentLoaded { sequence: 3 });
        assert_eq!(f.surface.stats().resumes, before + 2);
    }

    #[test]
    fn replay_end_of_stream_always_loops() {
        let mut f = fixture();
        f.controller.start();
        let gen = f.controller.generation();
        f.controller.handle_engine_event(gen, fatal());
        let gen = f.controller.generation();

        for _ in 0..4 {
            assert_eq!(
                f.controller.handle_engine_event(gen, EngineEvent::BufferEos),
                Some(Transition::Looped)
            );
        }

        assert_eq!(f.factory.rewinds(), 4);
        assert_eq!(f.surface.stats().rewinds, 4);
        assert_eq!(f.controller.stats().loops, 4);
        assert_eq!(f.controller.state(), SourceKind::Replay);
    }

    #[test]
    fn end_of_stream_on_live_is_ignored() {
        let mut f = fixture();
        f.controller.start();
        let gen = f.controller.generation();
        assert_eq!(f.controller.handle_engine_event(gen, EngineEvent::BufferEos), None);
        assert_eq!(f.factory.rewinds(), 0);
    }

    #[test]
    fn probe_results() {
        let mut f = fixture();
        f.controller.start();

        // Ignored while LIVE
        assert_eq!(f.controller.handle_probe_result(true), None);

        let gen = f.controller.generation();
        f.controller.handle_engine_event(gen, fatal());
        assert_eq!(f.controller.handle_probe_result(false), None);
        assert_eq!(f.controller.state(), SourceKind::Replay);

        assert_eq!(
            f.controller.handle_probe_result(true),
            Some(Transition::Recovered)
        );
        assert_eq!(f.controller.state(), SourceKind::Live);
        assert!(!f.controller.needs_probe());
        assert_eq!(f.controller.stats().recoveries, 1);
    }

    #[test]
    fn attach_failure_blanks_surface_until_sources_change() {
        let mut f = fixture();
        f.controller.update_sources("not a url", REPLAY);
        assert_eq!(f.controller.stats().attach_failures, 1);
        assert!(!f.controller.has_engine());
        assert!(!f.surface.stats().playing);
        assert!(f.factory.created_kinds().is_empty());

        assert!(f.controller.update_sources(LIVE, REPLAY));
        assert!(f.controller.has_engine());
        assert_eq!(f.factory.created_kinds(), vec![SourceKind::Live]);
    }

    #[test]
    fn engine_refusal_is_contained() {
        let mut f = fixture();
        f.factory.refuse_creation(true);
        assert!(!f.controller.start());
        assert_eq!(f.controller.stats().attach_failures, 1);
        assert_eq!(f.controller.ledger().constructed, 0);

        f.factory.refuse_creation(false);
        assert!(f.controller.update_sources(LIVE, REPLAY));
    }

    #[test]
    fn detached_surface_is_an_attach_failure() {
        let mut f = fixture();
        f.surface.detach();
        assert!(!f.controller.start());
        assert_eq!(f.controller.stats().attach_failures, 1);
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut f = fixture();
        f.controller.start();
        f.controller.teardown();
        f.controller.teardown();

        assert!(f.controller.is_torn_down());
        assert!(!f.controller.needs_probe());
        assert_eq!(f.factory.destroyed(), 1);
        assert_eq!(f.surface.stats().clears, 1);
        assert!(!f.controller.start());
        assert_eq!(f.controller.handle_engine_event(1, fatal()), None);
    }
}
