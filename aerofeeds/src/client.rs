//! HTTP client for the AeroWatch backend APIs
//!
//! Three services are involved, each with its own base URL:
//!
//! - the stream registry (`/streams`)
//! - the analytics service (`/analytics/people`, `/analytics/vehicles`)
//! - the incident bridge (`/bridge/webhook`)
//!
//! # Example
//!
//! ```no_run
//! use aerofeeds::{FeedsClient, StreamStatus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FeedsClient::builder()
//!         .api_base("http://localhost:8080/api")
//!         .build()?;
//!
//!     for stream in client.list_streams_with_status(StreamStatus::Live).await? {
//!         println!("{} @ {}", stream.display_pilot(), stream.display_place());
//!     }
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use crate::models::{
    AnalyticsKind, AnalyticsResponse, BridgeReply, CombinedAnalytics, IncidentRequest, NewStream,
    Stream, StreamStatus,
};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};

/// Default stream registry base URL
pub const DEFAULT_API_BASE: &str = "http://localhost:8080/api";

/// Default analytics service base URL
pub const DEFAULT_ANALYTICS_BASE: &str = "http://localhost:8090/analytics-api";

/// Default incident bridge base URL
pub const DEFAULT_BRIDGE_BASE: &str = "http://localhost:8080/api";

/// Default timeout for HTTP requests (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = concat!("AeroWatch/", env!("CARGO_PKG_VERSION"), " (aerofeeds)");

/// Backend HTTP client
///
/// The client is stateless: polling and caching belong to the monitor.
#[derive(Debug, Clone)]
pub struct FeedsClient {
    pub(crate) client: Client,
    api_base: String,
    analytics_base: String,
    bridge_base: String,
    timeout: Duration,
}

impl FeedsClient {
    /// Create a client with default settings
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a builder for configuring the client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Create a client whose base URLs come from the `backend.*` keys
    #[cfg(feature = "aeroconfig")]
    pub fn from_config(config: &aeroconfig::Config) -> Result<Self> {
        use crate::config_ext::FeedsConfigExt;

        Self::builder()
            .api_base(config.get_feeds_api_base()?)
            .analytics_base(config.get_feeds_analytics_base()?)
            .bridge_base(config.get_feeds_bridge_base()?)
            .timeout(Duration::from_secs(config.get_feeds_request_timeout_secs()?))
            .build()
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn analytics_base(&self) -> &str {
        &self.analytics_base
    }

    pub fn bridge_base(&self) -> &str {
        &self.bridge_base
    }

    /// Get the internal HTTP client
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    // ========================================================================
    // Stream Registry
    // ========================================================================

    /// List every registered stream, in registry order
    pub async fn list_streams(&self) -> Result<Vec<Stream>> {
        let url = format!("{}/streams", self.api_base);
        debug!(%url, "Listing streams");

        let response = self.client.get(&url).timeout(self.timeout).send().await?;
        let response = Self::check_status(response, "list streams").await?;
        Ok(response.json().await?)
    }

    /// List streams filtered by status on the server side
    pub async fn list_streams_with_status(&self, status: StreamStatus) -> Result<Vec<Stream>> {
        let url = format!("{}/streams", self.api_base);
        debug!(%url, %status, "Listing streams by status");

        let response = self
            .client
            .get(&url)
            .query(&[("status", status.as_str())])
            .timeout(self.timeout)
            .send()
            .await?;
        let response = Self::check_status(response, "list streams").await?;
        Ok(response.json().await?)
    }

    /// Register a new drone stream
    ///
    /// The registry allocates the stream key and the ingest/playback URLs.
    pub async fn create_stream(&self, new_stream: &NewStream) -> Result<Stream> {
        if new_stream.pilot_name.trim().is_empty() || new_stream.place.trim().is_empty() {
            return Err(Error::invalid_input(
                "Both a pilot name and a flying place are required",
            ));
        }

        let url = format!("{}/streams", self.api_base);
        debug!(%url, pilot = %new_stream.pilot_name, place = %new_stream.place, "Creating stream");

        let response = self
            .client
            .post(&url)
            .json(new_stream)
            .timeout(self.timeout)
            .send()
            .await?;
        let response = Self::check_status(response, "create stream").await?;
        Ok(response.json().await?)
    }

    /// Delete a stream registration
    pub async fn delete_stream(&self, id: &str) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::invalid_input("A stream id is required"));
        }

        let url = format!("{}/streams/{}", self.api_base, id);
        debug!(%url, "Deleting stream");

        let response = self
            .client
            .delete(&url)
            .timeout(self.timeout)
            .send()
            .await?;
        Self::check_status(response, "delete stream").await?;
        Ok(())
    }

    // ========================================================================
    // Analytics
    // ========================================================================

    /// Fetch one detector's analytics for a stream
    pub async fn analytics(&self, kind: AnalyticsKind, stream_key: &str) -> Result<AnalyticsResponse> {
        let url = format!("{}/analytics/{}", self.analytics_base, kind.path_segment());

        let response = self
            .client
            .get(&url)
            .query(&[("streamKey", stream_key)])
            .timeout(self.timeout)
            .send()
            .await?;
        let response = Self::check_status(response, "analytics").await?;
        Ok(response.json().await?)
    }

    /// Fetch people and vehicle analytics concurrently
    ///
    /// A failing side is logged and left empty. Returns `None` when both
    /// sides failed.
    pub async fn combined_analytics(&self, stream_key: &str) -> Option<CombinedAnalytics> {
        let (people, vehicles) = futures::future::join(
            self.analytics(AnalyticsKind::People, stream_key),
            self.analytics(AnalyticsKind::Vehicles, stream_key),
        )
        .await;

        let keep = |kind: AnalyticsKind, result: Result<AnalyticsResponse>| match result {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(stream_key = %stream_key, %kind, "Analytics request failed: {}", err);
                None
            }
        };

        let combined = CombinedAnalytics {
            people: keep(AnalyticsKind::People, people),
            vehicles: keep(AnalyticsKind::Vehicles, vehicles),
        };

        if combined.is_empty() {
            None
        } else {
            Some(combined)
        }
    }

    // ========================================================================
    // Incident Bridge
    // ========================================================================

    /// Ask the bridge to capture a frame and escalate an incident
    pub async fn trigger_incident(&self, request: &IncidentRequest) -> Result<BridgeReply> {
        let url = format!("{}/bridge/webhook", self.bridge_base);
        debug!(%url, incident_id = request.incident_id, "Triggering incident");

        let response = self
            .client
            .post(&url)
            .json(request)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Bridge {
                status: status.as_u16(),
                body,
            });
        }

        Ok(BridgeReply::from_body(&body))
    }

    async fn check_status(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = body.trim();
        Err(Error::api_error(if detail.is_empty() {
            format!("Failed to {}: HTTP {}", what, status)
        } else {
            format!("Failed to {}: HTTP {}: {}", what, status, detail)
        }))
    }
}

/// Builder for FeedsClient
pub struct ClientBuilder {
    client: Option<Client>,
    api_base: String,
    analytics_base: String,
    bridge_base: String,
    timeout: Duration,
    user_agent: String,
    proxy: Option<String>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            client: None,
            api_base: DEFAULT_API_BASE.to_string(),
            analytics_base: DEFAULT_ANALYTICS_BASE.to_string(),
            bridge_base: DEFAULT_BRIDGE_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom HTTP client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the stream registry base URL
    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = normalize_base(url.into());
        self
    }

    /// Set the analytics service base URL
    pub fn analytics_base(mut self, url: impl Into<String>) -> Self {
        self.analytics_base = normalize_base(url.into());
        self
    }

    /// Set the incident bridge base URL
    pub fn bridge_base(mut self, url: impl Into<String>) -> Self {
        self.bridge_base = normalize_base(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set a proxy URL
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Build the client
    pub fn build(self) -> Result<FeedsClient> {
        for base in [&self.api_base, &self.analytics_base, &self.bridge_base] {
            url::Url::parse(base)?;
        }

        let client = if let Some(client) = self.client {
            client
        } else {
            let mut builder = Client::builder()
                .user_agent(&self.user_agent)
                .timeout(self.timeout);

            if let Some(proxy_url) = &self.proxy {
                let proxy = reqwest::Proxy::all(proxy_url)
                    .map_err(|e| Error::other(format!("Invalid proxy: {}", e)))?;
                builder = builder.proxy(proxy);
            }

            builder.build()?
        };

        Ok(FeedsClient {
            client,
            api_base: self.api_base,
            analytics_base: self.analytics_base,
            bridge_base: self.bridge_base,
            timeout: self.timeout,
        })
    }
}

fn normalize_base(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::default();
        assert_eq!(builder.api_base, DEFAULT_API_BASE);
        assert_eq!(builder.analytics_base, DEFAULT_ANALYTICS_BASE);
        assert_eq!(builder.bridge_base, DEFAULT_BRIDGE_BASE);
        assert_eq!(
            builder.timeout,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        );
        assert!(builder.user_agent.starts_with("AeroWatch/"));
    }

    #[test]
    fn test_builder_strips_trailing_slash() {
        let client = FeedsClient::builder()
            .api_base("http://registry.local/api/ ")
            .analytics_base("http://analytics.local/")
            .build()
            .unwrap();
        assert_eq!(client.api_base(), "http://registry.local/api");
        assert_eq!(client.analytics_base(), "http://analytics.local");
    }

    #[test]
    fn test_builder_rejects_invalid_base() {
        let result = FeedsClient::builder().bridge_base("not a url").build();
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_delete_requires_id() {
        let client = FeedsClient::new().unwrap();
        assert!(matches!(
            client.delete_stream("  ").await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires a running registry
    async fn test_list_streams_live_backend() {
        let client = FeedsClient::new().unwrap();
        let streams = client.list_streams().await.unwrap();
        println!("{} streams registered", streams.len());
    }
}
