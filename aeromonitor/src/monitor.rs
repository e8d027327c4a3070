//! Wires the pollers and the video wall together.
//!
//! The stream poller publishes a [`StreamBoard`]; the wall task reconciles
//! its tiles on every board change and republishes tile statuses; the
//! analytics poller reads the same board on its own period. Everything hangs
//! off one root cancellation token.

use std::sync::Arc;
use std::time::Duration;

use aerofeeds::{FeedsClient, VisibilityPolicy};
use aeroplayback::{EngineFactory, HlsSettings, LiveProbe, ReplayUrlPolicy};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::analytics_poller::{
    AnalyticsMap, AnalyticsPoller, DEFAULT_ANALYTICS_INTERVAL, DEFAULT_ANALYTICS_MAX_STREAMS,
};
use crate::error::{MonitorError, Result};
use crate::scheduler::PeriodicTask;
use crate::streams_poller::{StreamBoard, StreamListPoller, DEFAULT_STREAMS_INTERVAL};
use crate::wall::{TileStatus, VideoWall};

/// How often tile statuses are re-read between board changes
pub const STATUS_REFRESH: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq)]
pub struct MonitorSettings {
    pub streams_interval: Duration,
    pub analytics_interval: Duration,
    pub analytics_max_streams: usize,
    pub visibility: VisibilityPolicy,
    pub replay_policy: ReplayUrlPolicy,
    pub probe_interval: Duration,
    pub hls_proxy_base: Option<String>,
    pub hls: HlsSettings,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            streams_interval: DEFAULT_STREAMS_INTERVAL,
            analytics_interval: DEFAULT_ANALYTICS_INTERVAL,
            analytics_max_streams: DEFAULT_ANALYTICS_MAX_STREAMS,
            visibility: VisibilityPolicy::default(),
            replay_policy: ReplayUrlPolicy::default(),
            probe_interval: aeroplayback::session::DEFAULT_PROBE_INTERVAL,
            hls_proxy_base: None,
            hls: HlsSettings::default(),
        }
    }
}

impl MonitorSettings {
    /// Reads the `backend.*`, `playback.*` and `monitor.*` keys
    #[cfg(feature = "aeroconfig")]
    pub fn from_config(config: &aeroconfig::Config) -> Result<Self> {
        use crate::config_ext::MonitorConfigExt;
        use aerofeeds::FeedsConfigExt;
        use aeroplayback::PlaybackConfigExt;

        Ok(Self {
            streams_interval: config.get_monitor_streams_interval()?,
            analytics_interval: config.get_monitor_analytics_interval()?,
            analytics_max_streams: config.get_monitor_analytics_max_streams()?,
            visibility: config.get_monitor_visibility_policy()?,
            replay_policy: config.get_playback_replay_url_policy()?,
            probe_interval: config.get_playback_probe_interval()?,
            hls_proxy_base: config.get_feeds_hls_proxy_base()?,
            hls: config.get_playback_hls_settings()?,
        })
    }
}

pub struct Monitor {
    cancel: CancellationToken,
    streams: Arc<StreamListPoller>,
    analytics: Arc<AnalyticsPoller>,
    tiles: watch::Receiver<Vec<TileStatus>>,
    tasks: Vec<PeriodicTask>,
    wall_task: Option<JoinHandle<()>>,
}

impl Monitor {
    pub fn start(
        client: FeedsClient,
        settings: MonitorSettings,
        factory: Arc<dyn EngineFactory>,
        probe: Arc<dyn LiveProbe>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;
        let cancel = CancellationToken::new();

        let streams = Arc::new(StreamListPoller::new(client.clone(), settings.visibility.clone()));
        let analytics = Arc::new(AnalyticsPoller::new(client, settings.analytics_max_streams));

        let wall = VideoWall::new(factory, probe)
            .with_replay_policy(settings.replay_policy.clone())
            .with_probe_interval(settings.probe_interval)
            .with_hls_proxy_base(settings.hls_proxy_base.clone());
        let (tiles_tx, tiles_rx) = watch::channel(Vec::new());
        let wall_task = runtime.spawn(run_wall(
            wall,
            streams.subscribe(),
            tiles_tx,
            cancel.child_token(),
        ));

        let tasks = vec![
            streams.spawn(settings.streams_interval, &cancel)?,
            analytics.spawn(streams.subscribe(), settings.analytics_interval, &cancel)?,
        ];

        info!(
            streams_every = ?settings.streams_interval,
            analytics_every = ?settings.analytics_interval,
            "Monitor started"
        );

        Ok(Self {
            cancel,
            streams,
            analytics,
            tiles: tiles_rx,
            tasks,
            wall_task: Some(wall_task),
        })
    }

    pub fn board(&self) -> watch::Receiver<StreamBoard> {
        self.streams.subscribe()
    }

    pub fn analytics(&self) -> watch::Receiver<AnalyticsMap> {
        self.analytics.subscribe()
    }

    pub fn tiles(&self) -> watch::Receiver<Vec<TileStatus>> {
        self.tiles.clone()
    }

    /// Stops the pollers and unmounts every tile.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.stop().await;
        }
        if let Some(handle) = self.wall_task.take() {
            let _ = handle.await;
        }
        info!("Monitor stopped");
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_wall(
    mut wall: VideoWall,
    mut board: watch::Receiver<StreamBoard>,
    tiles: watch::Sender<Vec<TileStatus>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(STATUS_REFRESH);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            changed = board.changed() => {
                if changed.is_err() {
                    break;
                }
                let streams = board.borrow_and_update().streams.clone();
                wall.reconcile(&streams).await;
            }
            _ = ticker.tick() => {}
        }

        let statuses = wall.statuses();
        tiles.send_if_modified(|current| {
            if *current == statuses {
                false
            } else {
                *current = statuses;
                true
            }
        });
    }

    wall.clear().await;
    tiles.send_replace(Vec::new());
    debug!("Video wall task stopped");
}
