//! Reachability checks for the LIVE playlist while a session plays REPLAY.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, trace};

/// Default timeout of a single probe request
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(4);

#[async_trait]
pub trait LiveProbe: Send + Sync {
    /// Transport failures count as unreachable.
    async fn is_reachable(&self, url: &str) -> bool;
}

/// Probe issuing an HTTP `HEAD` request; only a 2xx status is reachable.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    timeout: Duration,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Shares a connection pool with other components
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl LiveProbe for HttpProbe {
    async fn is_reachable(&self, url: &str) -> bool {
        match self.client.head(url).timeout(self.timeout).send().await {
            Ok(response) => {
                let status = response.status();
                trace!(%url, %status, "Probe answered");
                status.is_success()
            }
            Err(err) => {
                debug!(%url, "Probe failed: {}", err);
                false
            }
        }
    }
}
