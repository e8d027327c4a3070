//! Playback session driver.
//!
//! A mounted session is one tokio task owning a [`ResilienceController`].
//! The task handles one thing at a time: an engine event, a probe deadline
//! or cancellation. The probe deadline is armed only while the controller
//! is on REPLAY, so no probe ever runs while LIVE plays.
//!
//! Dropping the [`SessionHandle`] cancels the task; [`SessionHandle::unmount`]
//! also waits for it and returns what happened during the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::controller::{ControllerStats, ResilienceController, Transition};
use crate::engine::{EngineFactory, LedgerSnapshot, TaggedEvent};
use crate::error::{PlaybackError, Result};
use crate::probe::LiveProbe;
use crate::source::{ReplayUrlPolicy, SourceKind};
use crate::surface::PlaybackSurface;

/// Default delay between two LIVE probes while on REPLAY
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(5000);

/// What to play.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSpec {
    pub stream_key: String,
    pub live_url: String,
    pub replay_url: String,
    pub probe_interval: Duration,
}

impl SessionSpec {
    pub fn new(stream_key: impl Into<String>, live_url: impl Into<String>, policy: &ReplayUrlPolicy) -> Self {
        let stream_key = stream_key.into();
        let live_url = live_url.into();
        let replay_url = policy.replay_url(&live_url, &stream_key);
        Self {
            stream_key,
            live_url,
            replay_url,
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }
}

/// Summary returned by [`SessionHandle::unmount`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub stream_key: String,
    pub final_source: SourceKind,
    pub probes: u64,
    pub stats: ControllerStats,
    pub ledger: LedgerSnapshot,
}

pub struct PlaybackSession {
    id: Uuid,
    controller: ResilienceController,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    probe: Arc<dyn LiveProbe>,
    probe_interval: Duration,
    state_tx: watch::Sender<SourceKind>,
    cancel: CancellationToken,
}

impl PlaybackSession {
    /// Attaches LIVE to `surface` and starts driving the session.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(
        spec: SessionSpec,
        factory: Arc<dyn EngineFactory>,
        surface: Arc<dyn PlaybackSurface>,
        probe: Arc<dyn LiveProbe>,
    ) -> Result<SessionHandle> {
        let runtime = Handle::try_current().map_err(|_| PlaybackError::NoRuntime)?;

        let id = Uuid::new_v4();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let controller = ResilienceController::new(
            spec.stream_key.clone(),
            spec.live_url.clone(),
            spec.replay_url.clone(),
            factory,
            surface,
            events_tx,
        );
        let (state_tx, state_rx) = watch::channel(SourceKind::Live);
        let cancel = CancellationToken::new();

        let session = PlaybackSession {
            id,
            controller,
            events_rx,
            probe,
            probe_interval: spec.probe_interval,
            state_tx,
            cancel: cancel.clone(),
        };

        debug!(session = %id, stream_key = %spec.stream_key, "Mounting playback session");
        let task = runtime.spawn(session.run());

        Ok(SessionHandle {
            id,
            stream_key: spec.stream_key,
            live_url: spec.live_url,
            state: state_rx,
            cancel,
            task: Some(task),
        })
    }

    async fn run(self) -> SessionReport {
        let PlaybackSession {
            id,
            mut controller,
            mut events_rx,
            probe,
            probe_interval,
            state_tx,
            cancel,
        } = self;

        controller.start();
        state_tx.send_if_modified(|s| replace(s, controller.state()));

        let mut probes = 0u64;
        let mut probe_at: Option<Instant> = None;

        loop {
            if controller.needs_probe() {
                probe_at.get_or_insert_with(|| Instant::now() + probe_interval);
            } else {
                probe_at = None;
            }

            let deadline = probe_at;
            let probe_deadline = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            let transition = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(tagged) = events_rx.recv() => {
                    controller.handle_engine_event(tagged.generation, tagged.event)
                }
                _ = probe_deadline => {
                    probe_at = None;
                    probes += 1;
                    let live_url = controller.live_url().to_string();
                    let reachable = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        reachable = probe.is_reachable(&live_url) => Some(reachable),
                    };
                    let Some(reachable) = reachable else {
                        debug!(session = %id, "Probe abandoned, session cancelled");
                        break;
                    };
                    controller.handle_probe_result(reachable)
                }
            };

            match transition {
                Some(Transition::FailedOver) => {
                    info!(session = %id, stream_key = %controller.stream_key(), "Switched to REPLAY")
                }
                Some(Transition::Recovered) => {
                    info!(session = %id, stream_key = %controller.stream_key(), probes, "Back on LIVE")
                }
                Some(Transition::Looped) | None => {}
            }
            state_tx.send_if_modified(|s| replace(s, controller.state()));
        }

        controller.teardown();

        let report = SessionReport {
            session_id: id,
            stream_key: controller.stream_key().to_string(),
            final_source: controller.state(),
            probes,
            stats: controller.stats(),
            ledger: controller.ledger(),
        };
        debug!(session = %id, ?report, "Playback session ended");
        report
    }
}

fn replace(current: &mut SourceKind, next: SourceKind) -> bool {
    if *current == next {
        false
    } else {
        *current = next;
        true
    }
}

/// Owner side of a mounted session.
pub struct SessionHandle {
    id: Uuid,
    stream_key: String,
    live_url: String,
    state: watch::Receiver<SourceKind>,
    cancel: CancellationToken,
    task: Option<JoinHandle<SessionReport>>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    pub fn live_url(&self) -> &str {
        &self.live_url
    }

    pub fn current_source(&self) -> SourceKind {
        *self.state.borrow()
    }

    /// Receiver notified on every LIVE/REPLAY switch.
    pub fn subscribe(&self) -> watch::Receiver<SourceKind> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Tears the session down and waits for its task.
    pub async fn unmount(mut self) -> Result<SessionReport> {
        self.cancel.cancel();
        let task = self
            .task
            .take()
            .ok_or_else(|| PlaybackError::engine("session already unmounted"))?;
        task.await
            .map_err(|e| PlaybackError::engine(format!("session task failed: {}", e)))
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("stream_key", &self.stream_key)
            .field("source", &self.current_source())
            .finish()
    }
}
