//! Periodic people/vehicle analytics for the visible streams.
//!
//! A round analyses the first `max_streams` streams concurrently and merges
//! the answers into the shared [`AnalyticsMap`]. Rounds never overlap: while
//! one is in flight, further requests are skipped. The flag belongs to the
//! poller instance, so independent pollers do not block each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aerofeeds::{CombinedAnalytics, FeedsClient, Stream};
use futures::future::join_all;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::Result;
use crate::scheduler::PeriodicTask;
use crate::streams_poller::StreamBoard;

/// Default analytics refresh period
pub const DEFAULT_ANALYTICS_INTERVAL: Duration = Duration::from_millis(15000);

/// Default number of streams analysed per round
pub const DEFAULT_ANALYTICS_MAX_STREAMS: usize = 6;

/// Latest analytics by stream key
pub type AnalyticsMap = HashMap<String, CombinedAnalytics>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Another round was still running.
    Skipped,
    Completed { analysed: usize, updated: usize },
}

pub struct AnalyticsPoller {
    client: FeedsClient,
    max_streams: usize,
    in_flight: AtomicBool,
    skipped: AtomicU64,
    results: watch::Sender<AnalyticsMap>,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AnalyticsPoller {
    pub fn new(client: FeedsClient, max_streams: usize) -> Self {
        let (results, _) = watch::channel(AnalyticsMap::new());
        Self {
            client,
            max_streams,
            in_flight: AtomicBool::new(false),
            skipped: AtomicU64::new(0),
            results,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalyticsMap> {
        self.results.subscribe()
    }

    pub fn snapshot(&self) -> AnalyticsMap {
        self.results.borrow().clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Rounds skipped because one was already running
    pub fn skipped_rounds(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub async fn poll_round(&self, streams: &[Stream]) -> RoundOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            trace!("Analytics round still running, skipping");
            return RoundOutcome::Skipped;
        };

        let keys: Vec<&str> = streams
            .iter()
            .take(self.max_streams)
            .map(|s| s.stream_key.as_str())
            .collect();

        let answers = join_all(keys.iter().map(|key| async move {
            (key.to_string(), self.client.combined_analytics(key).await)
        }))
        .await;

        let mut updated = 0;
        self.results.send_modify(|map| {
            for (key, answer) in answers {
                if let Some(combined) = answer {
                    map.entry(key).or_default().merge(combined);
                    updated += 1;
                }
            }
        });

        debug!(analysed = keys.len(), updated, "Analytics round done");
        RoundOutcome::Completed {
            analysed: keys.len(),
            updated,
        }
    }

    /// Runs a round now and then every `period`, on the streams currently on
    /// `board`.
    pub fn spawn(
        self: &Arc<Self>,
        board: watch::Receiver<StreamBoard>,
        period: Duration,
        parent: &CancellationToken,
    ) -> Result<PeriodicTask> {
        let poller = Arc::clone(self);
        PeriodicTask::spawn("analytics", period, parent, move || {
            let poller = poller.clone();
            let streams = board.borrow().streams.clone();
            async move {
                poller.poll_round(&streams).await;
            }
        })
    }
}
