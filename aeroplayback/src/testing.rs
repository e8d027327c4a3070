//! In-memory engine and probe used by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::engine::{EngineEvents, EngineFactory, MediaEngine};
use crate::error::{PlaybackError, Result};
use crate::probe::LiveProbe;
use crate::source::{EngineProfile, SourceKind};
use crate::surface::PlaybackSurface;

#[derive(Default)]
struct FactoryState {
    refuse: bool,
    alive: usize,
    max_alive: usize,
    destroyed: usize,
    rewinds: usize,
    created: Vec<SourceKind>,
    loaded: Vec<String>,
    emitters: Vec<EngineEvents>,
}

#[derive(Default)]
pub(crate) struct FakeEngineFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl FakeEngineFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FactoryState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub(crate) fn refuse_creation(&self, refuse: bool) {
        self.with_state(|s| s.refuse = refuse);
    }

    pub(crate) fn created_kinds(&self) -> Vec<SourceKind> {
        self.with_state(|s| s.created.clone())
    }

    pub(crate) fn loaded_urls(&self) -> Vec<String> {
        self.with_state(|s| s.loaded.clone())
    }

    pub(crate) fn alive(&self) -> usize {
        self.with_state(|s| s.alive)
    }

    pub(crate) fn max_alive(&self) -> usize {
        self.with_state(|s| s.max_alive)
    }

    pub(crate) fn destroyed(&self) -> usize {
        self.with_state(|s| s.destroyed)
    }

    pub(crate) fn rewinds(&self) -> usize {
        self.with_state(|s| s.rewinds)
    }

    /// Emitter of the most recently created engine.
    pub(crate) fn latest_events(&self) -> Option<EngineEvents> {
        self.with_state(|s| s.emitters.last().cloned())
    }
}

impl EngineFactory for FakeEngineFactory {
    fn create(&self, profile: &EngineProfile, events: EngineEvents) -> Result<Box<dyn MediaEngine>> {
        self.with_state(|s| {
            if s.refuse {
                return Err(PlaybackError::engine("engine refused"));
            }
            s.alive += 1;
            s.max_alive = s.max_alive.max(s.alive);
            s.created.push(profile.kind);
            s.emitters.push(events);
            Ok(())
        })?;

        Ok(Box::new(FakeEngine {
            state: self.state.clone(),
            destroyed: false,
        }))
    }
}

struct FakeEngine {
    state: Arc<Mutex<FactoryState>>,
    destroyed: bool,
}

impl MediaEngine for FakeEngine {
    fn load_source(&mut self, url: &Url) -> Result<()> {
        self.state.lock().unwrap().loaded.push(url.to_string());
        Ok(())
    }

    fn attach_surface(&mut self, _surface: Arc<dyn PlaybackSurface>) -> Result<()> {
        Ok(())
    }

    fn start_load(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop_load(&mut self) {}

    fn rewind(&mut self) {
        self.state.lock().unwrap().rewinds += 1;
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let mut state = self.state.lock().unwrap();
        state.alive -= 1;
        state.destroyed += 1;
    }
}

/// Probe answering from a script; unreachable once the script is exhausted.
#[derive(Default)]
pub(crate) struct ScriptedProbe {
    answers: Mutex<VecDeque<bool>>,
    calls: AtomicUsize,
    latency: Duration,
}

impl ScriptedProbe {
    pub(crate) fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            ..Self::default()
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveProbe for ScriptedProbe {
    async fn is_reachable(&self, _url: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.answers.lock().unwrap().pop_front().unwrap_or(false)
    }
}
