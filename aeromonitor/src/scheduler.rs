//! Cancellable periodic jobs.
//!
//! A [`PeriodicTask`] runs its job right away, then once per period. Each task
//! holds a child of the caller's cancellation token: cancelling the parent
//! stops every task spawned from it, and a job in progress is abandoned at
//! its next await point. Late ticks are delayed rather than bursted.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{MonitorError, Result};

const MIN_PERIOD: Duration = Duration::from_millis(1);

pub struct PeriodicTask {
    name: String,
    period: Duration,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(
        name: impl Into<String>,
        period: Duration,
        parent: &CancellationToken,
        mut job: F,
    ) -> Result<Self>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;
        let name = name.into();
        let period = period.max(MIN_PERIOD);
        let cancel = parent.child_token();

        let token = cancel.clone();
        let task_name = name.clone();
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(task = %task_name, ?period, "Periodic task started");

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                trace!(task = %task_name, "Running periodic job");
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = job() => {}
                }
            }

            debug!(task = %task_name, "Periodic task stopped");
        });

        Ok(Self {
            name,
            period,
            cancel,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Requests the task to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels the task and waits until it has exited.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
