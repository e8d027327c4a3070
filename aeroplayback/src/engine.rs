//! Playback engine seam.
//!
//! An engine loads one playlist, pushes fragments into a surface and reports
//! what happens through [`EngineEvents`]. Each engine gets a generation
//! number; events are tagged with it so that anything emitted by an engine
//! that has since been destroyed can be recognised and dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;
use crate::source::EngineProfile;
use crate::surface::PlaybackSurface;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// The playlist was loaded and understood.
    ManifestParsed,
    /// A fragment was handed to the surface.
    FragmentLoaded { sequence: u64 },
    /// The end of a finished playlist was reached.
    BufferEos,
    Error { fatal: bool, details: String },
}

impl EngineEvent {
    pub fn fatal(details: impl Into<String>) -> Self {
        EngineEvent::Error {
            fatal: true,
            details: details.into(),
        }
    }

    pub fn non_fatal(details: impl Into<String>) -> Self {
        EngineEvent::Error {
            fatal: false,
            details: details.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: EngineEvent,
}

/// Event emitter handed to an engine at construction.
#[derive(Clone, Debug)]
pub struct EngineEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EngineEvents {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false when nobody listens anymore (session gone).
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

pub trait MediaEngine: Send {
    fn load_source(&mut self, url: &Url) -> Result<()>;

    fn attach_surface(&mut self, surface: Arc<dyn PlaybackSurface>) -> Result<()>;

    /// Starts fetching. Requires a loaded source and an attached surface.
    fn start_load(&mut self) -> Result<()>;

    fn stop_load(&mut self);

    /// Restarts delivery from the first segment of the playlist.
    fn rewind(&mut self);

    /// Releases everything. The engine must not emit events afterwards.
    fn destroy(&mut self);
}

pub trait EngineFactory: Send + Sync {
    fn create(&self, profile: &EngineProfile, events: EngineEvents)
        -> Result<Box<dyn MediaEngine>>;
}

/// Counts engines created and destroyed by one controller.
#[derive(Debug, Default)]
pub struct EngineLedger {
    constructed: AtomicU64,
    destroyed: AtomicU64,
    max_alive: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub constructed: u64,
    pub destroyed: u64,
    /// Highest number of engines alive at the same time.
    pub max_alive: u64,
}

impl LedgerSnapshot {
    pub fn alive(&self) -> u64 {
        self.constructed - self.destroyed
    }
}

impl EngineLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_constructed(&self) {
        let constructed = self.constructed.fetch_add(1, Ordering::SeqCst) + 1;
        let alive = constructed - self.destroyed.load(Ordering::SeqCst);
        self.max_alive.fetch_max(alive, Ordering::SeqCst);
    }

    fn record_destroyed(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            constructed: self.constructed.load(Ordering::SeqCst),
            destroyed: self.destroyed.load(Ordering::SeqCst),
            max_alive: self.max_alive.load(Ordering::SeqCst),
        }
    }
}

/// Owns one engine and destroys it when released or dropped.
pub struct EngineGuard {
    engine: Box<dyn MediaEngine>,
    generation: u64,
    ledger: Arc<EngineLedger>,
    destroyed: bool,
}

impl EngineGuard {
    pub fn new(engine: Box<dyn MediaEngine>, generation: u64, ledger: Arc<EngineLedger>) -> Self {
        ledger.record_constructed();
        Self {
            engine,
            generation,
            ledger,
            destroyed: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn engine_mut(&mut self) -> &mut dyn MediaEngine {
        self.engine.as_mut()
    }

    /// Stops and destroys the engine now.
    pub fn release(mut self) {
        self.destroy_engine();
    }

    fn destroy_engine(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.engine.stop_load();
        self.engine.destroy();
        self.ledger.record_destroyed();
    }
}

impl Drop for EngineGuard {
    fn drop(&mut self) {
        self.destroy_engine();
    }
}

impl std::fmt::Debug for EngineGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineGuard")
            .field("generation", &self.generation)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingEngine {
        destroyed: Arc<AtomicUsize>,
    }

    impl MediaEngine for CountingEngine {
        fn load_source(&mut self, _url: &Url) -> Result<()> {
            Ok(())
        }
        fn attach_surface(&mut self, _surface: Arc<dyn PlaybackSurface>) -> Result<()> {
            Ok(())
        }
        fn start_load(&mut self) -> Result<()> {
            Ok(())
        }
        fn stop_load(&mut self) {}
        fn rewind(&mut self) {}
        fn destroy(&mut self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn guard_destroys_engine_once() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let ledger = Arc::new(EngineLedger::new());

        let guard = EngineGuard::new(
            Box::new(CountingEngine {
                destroyed: destroyed.clone(),
            }),
            1,
            ledger.clone(),
        );
        assert_eq!(ledger.snapshot().alive(), 1);
        guard.release();
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);

        {
            let _dropped = EngineGuard::new(
                Box::new(CountingEngine {
                    destroyed: destroyed.clone(),
                }),
                2,
                ledger.clone(),
            );
        }
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.constructed, 2);
        assert_eq!(snapshot.destroyed, 2);
        assert_eq!(snapshot.max_alive, 1);
    }

    #[test]
    fn events_are_tagged_with_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = EngineEvents::new(4, tx);
        assert!(events.emit(EngineEvent::BufferEos));

        let tagged = rx.try_recv().unwrap();
        assert_eq!(tagged.generation, 4);
        assert_eq!(tagged.event, EngineEvent::BufferEos);

        drop(rx);
        assert!(!events.emit(EngineEvent::ManifestParsed));
    }
}
