//! Periodic refresh of the stream registry.

use std::sync::Arc;
use std::time::Duration;

use aerofeeds::{FeedsClient, Stream, VisibilityPolicy};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::scheduler::PeriodicTask;

/// Default registry refresh period
pub const DEFAULT_STREAMS_INTERVAL: Duration = Duration::from_millis(8000);

/// What the wall should show.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamBoard {
    /// Visible streams, already filtered and ordered.
    pub streams: Vec<Stream>,
    /// Banner text of the last failed refresh.
    pub error: Option<String>,
    /// True until the first refresh completed.
    pub loading: bool,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Default for StreamBoard {
    fn default() -> Self {
        Self {
            streams: Vec::new(),
            error: None,
            loading: true,
            refreshed_at: None,
        }
    }
}

pub struct StreamListPoller {
    client: FeedsClient,
    policy: VisibilityPolicy,
    board: watch::Sender<StreamBoard>,
}

impl StreamListPoller {
    pub fn new(client: FeedsClient, policy: VisibilityPolicy) -> Self {
        let (board, _) = watch::channel(StreamBoard::default());
        Self {
            client,
            policy,
            board,
        }
    }

    pub fn policy(&self) -> &VisibilityPolicy {
        &self.policy
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamBoard> {
        self.board.subscribe()
    }

    pub fn board(&self) -> StreamBoard {
        self.board.borrow().clone()
    }

    /// Fetches the list once. On failure the previous streams stay on the
    /// board and the error banner is set.
    pub async fn refresh(&self) -> bool {
        match self.client.list_streams().await {
            Ok(streams) => {
                let now = Utc::now();
                let visible = self.policy.apply(&streams, now.timestamp_millis());
                debug!(
                    registered = streams.len(),
                    visible = visible.len(),
                    "Stream list refreshed"
                );
                self.board.send_modify(|board| {
                    board.streams = visible;
                    board.error = None;
                    board.loading = false;
                    board.refreshed_at = Some(now);
                });
                true
            }
            Err(err) => {
                warn!("Failed to fetch streams: {}", err);
                self.board.send_modify(|board| {
                    board.error = Some(format!("Failed to fetch streams: {}", err));
                    board.loading = false;
                });
                false
            }
        }
    }

    /// Refreshes now and then every `period` until `parent` is cancelled.
    pub fn spawn(self: &Arc<Self>, period: Duration, parent: &CancellationToken) -> Result<PeriodicTask> {
        let poller = Arc::clone(self);
        PeriodicTask::spawn("streams", period, parent, move || {
            let poller = poller.clone();
            async move {
                poller.refresh().await;
            }
        })
    }
}
