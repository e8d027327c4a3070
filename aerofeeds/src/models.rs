//! Data models for the backend API payloads
//!
//! This module contains the structures exchanged with the stream registry
//! (`/streams`), the analytics service (`/analytics/*`) and the incident
//! bridge (`/bridge/webhook`).

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Pseudo-place used by place selectors to mean "every place"
pub const ALL_PLACES: &str = "ALL";

const UNKNOWN_PILOT: &str = "Unknown Pilot";
const UNKNOWN_LOCATION: &str = "Unknown Location";

// ============================================================================
// Stream Registry Models
// ============================================================================

/// Lifecycle status of a registered drone stream
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamStatus {
    /// Registered, the drone has not started publishing yet
    #[default]
    Pending,
    /// The RTMP ingest is receiving data
    Live,
    /// Publishing stopped; the backend may still serve a replay window
    Ended,
}

impl StreamStatus {
    /// Wire representation (`PENDING`, `LIVE`, `ENDED`)
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Pending => "PENDING",
            StreamStatus::Live => "LIVE",
            StreamStatus::Ended => "ENDED",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stream registration as returned by `GET /streams`
///
/// Timestamps are epoch milliseconds. Coordinates are optional and only
/// provided by some registry deployments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: String,
    #[serde(default)]
    pub pilot_name: String,
    #[serde(default)]
    pub place: String,
    pub stream_key: String,
    #[serde(default)]
    pub rtmp_url: String,
    #[serde(default)]
    pub hls_url: String,
    #[serde(default)]
    pub status: StreamStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

impl Stream {
    /// Whether the registry reports the stream as publishing
    pub fn is_live(&self) -> bool {
        self.status == StreamStatus::Live
    }

    /// Pilot name, or "Unknown Pilot"
    pub fn display_pilot(&self) -> &str {
        let name = self.pilot_name.trim();
        if name.is_empty() {
            UNKNOWN_PILOT
        } else {
            name
        }
    }

    /// Place name, falling back to coordinates and then "Unknown Location"
    pub fn display_place(&self) -> String {
        let place = self.place.trim();
        if !place.is_empty() {
            return place.to_string();
        }
        match self.coordinates() {
            Some((lat, lon)) => format!("{:.5}, {:.5}", lat, lon),
            None => UNKNOWN_LOCATION.to_string(),
        }
    }

    /// `(lat, lon)` when both are known
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lon)
    }

    /// Map search URL for the drone position
    pub fn map_url(&self) -> Option<String> {
        self.coordinates().map(|(lat, lon)| {
            format!(
                "https://www.google.com/maps/search/?api=1&query={},{}",
                lat, lon
            )
        })
    }

    /// RTMP server part of the ingest URL (`rtmp://host/live`)
    ///
    /// Pilots enter the server and the stream key separately in the DJI app.
    pub fn rtmp_server(&self) -> String {
        let base = match self.rtmp_url.find("/live") {
            Some(idx) => &self.rtmp_url[..idx],
            None => self.rtmp_url.as_str(),
        };
        format!("{}/live", base)
    }

    /// Single RTMP URL with the key appended (`rtmp://host/live/KEY`)
    pub fn rtmp_publish_url(&self) -> String {
        format!("{}/{}", self.rtmp_server(), self.stream_key)
    }

    /// Registration time
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at.and_then(DateTime::from_timestamp_millis)
    }

    /// URL the player should load for this stream
    ///
    /// When a proxy base is given, only the path of `hlsUrl` is kept and
    /// appended to it (`http://34.93.1.2/hls/KEY.m3u8` with proxy
    /// `https://ops.example` becomes `https://ops.example/hls/KEY.m3u8`).
    /// An unparsable `hlsUrl` is returned untouched.
    pub fn playback_url(&self, proxy_base: Option<&str>) -> String {
        let Some(base) = proxy_base.map(str::trim).filter(|b| !b.is_empty()) else {
            return self.hls_url.clone();
        };

        match Url::parse(&self.hls_url) {
            Ok(parsed) => format!("{}{}", base.trim_end_matches('/'), parsed.path()),
            Err(err) => {
                tracing::warn!(
                    stream_key = %self.stream_key,
                    hls_url = %self.hls_url,
                    "Failed to parse HLS URL, using raw: {}",
                    err
                );
                self.hls_url.clone()
            }
        }
    }
}

/// Body of `POST /streams`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewStream {
    pub pilot_name: String,
    pub place: String,
}

impl NewStream {
    /// Builds a registration request; both fields are trimmed and required
    pub fn new(pilot_name: impl Into<String>, place: impl Into<String>) -> Result<Self> {
        let pilot_name = pilot_name.into().trim().to_string();
        let place = place.into().trim().to_string();
        if pilot_name.is_empty() || place.is_empty() {
            return Err(Error::invalid_input(
                "Both a pilot name and a flying place are required",
            ));
        }
        Ok(Self { pilot_name, place })
    }
}

// ============================================================================
// Analytics Models
// ============================================================================

/// Which detector an analytics request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyticsKind {
    People,
    Vehicles,
}

impl AnalyticsKind {
    /// Path segment under `/analytics/`
    pub fn path_segment(&self) -> &'static str {
        match self {
            AnalyticsKind::People => "people",
            AnalyticsKind::Vehicles => "vehicles",
        }
    }
}

impl fmt::Display for AnalyticsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Counts computed by the analytics service over a sliding window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub stream_key: String,
    pub window_seconds: f64,
    /// Distinct tracker ids seen in the window
    pub total_unique: u64,
    /// Detections in the most recent analysed frame
    pub current_frame_count: u64,
    pub density: String,
    pub model: String,
    pub analyzed_frames: u64,
    /// Epoch seconds of the analysis run
    pub timestamp: f64,
}

impl AnalyticsResponse {
    /// Time of the analysis run
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        let millis = self.timestamp * 1000.0;
        if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
            return None;
        }
        DateTime::from_timestamp_millis(millis as i64)
    }
}

/// People and vehicle results for one stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedAnalytics {
    pub people: Option<AnalyticsResponse>,
    pub vehicles: Option<AnalyticsResponse>,
}

impl CombinedAnalytics {
    pub fn is_empty(&self) -> bool {
        self.people.is_none() && self.vehicles.is_none()
    }

    /// Folds a newer result in, keeping the previous side when the newer
    /// result is missing it
    pub fn merge(&mut self, newer: CombinedAnalytics) {
        if newer.people.is_some() {
            self.people = newer.people;
        }
        if newer.vehicles.is_some() {
            self.vehicles = newer.vehicles;
        }
    }

    /// Most recent timestamp across both detectors
    pub fn latest_timestamp(&self) -> Option<f64> {
        match (&self.people, &self.vehicles) {
            (Some(p), Some(v)) => Some(p.timestamp.max(v.timestamp)),
            (Some(p), None) => Some(p.timestamp),
            (None, Some(v)) => Some(v.timestamp),
            (None, None) => None,
        }
    }
}

// ============================================================================
// Incident Bridge Models
// ============================================================================

/// What the incident bridge should capture a frame from
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum IncidentTarget {
    #[serde(rename = "streamKey")]
    StreamKey(String),
    #[serde(rename = "place")]
    Place(String),
}

/// Body of `POST /bridge/webhook`
///
/// Serializes to `{"incident_id": 27817, "streamKey": "EVT-..."}` or
/// `{"incident_id": 27817, "place": "North Gate"}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IncidentRequest {
    pub incident_id: u64,
    #[serde(flatten)]
    pub target: IncidentTarget,
}

impl IncidentRequest {
    pub fn for_stream(incident_id: u64, stream_key: impl Into<String>) -> Self {
        Self {
            incident_id,
            target: IncidentTarget::StreamKey(stream_key.into()),
        }
    }

    pub fn for_place(incident_id: u64, place: impl Into<String>) -> Self {
        Self {
            incident_id,
            target: IncidentTarget::Place(place.into()),
        }
    }

    /// Builds a request from an operator selection
    ///
    /// A selected stream key wins over the place; the `ALL` pseudo-place is
    /// not a target. The incident id must be numeric.
    pub fn from_selection(
        incident_id: &str,
        stream_key: Option<&str>,
        place: Option<&str>,
    ) -> Result<Self> {
        const MISSING: &str = "Please provide an incident id and choose a stream.";

        let incident_id = incident_id.trim();
        let stream_key = stream_key.map(str::trim).filter(|k| !k.is_empty());
        let place = place
            .map(str::trim)
            .filter(|p| !p.is_empty() && *p != ALL_PLACES);

        if incident_id.is_empty() || (stream_key.is_none() && place.is_none()) {
            return Err(Error::invalid_input(MISSING));
        }

        let id: u64 = incident_id
            .parse()
            .map_err(|_| Error::invalid_input(format!("Invalid incident id: {}", incident_id)))?;

        Ok(match (stream_key, place) {
            (Some(key), _) => Self::for_stream(id, key),
            (None, Some(place)) => Self::for_place(id, place),
            (None, None) => return Err(Error::invalid_input(MISSING)),
        })
    }
}

/// Opaque status payload returned by the incident bridge
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeReply(pub serde_json::Value);

impl BridgeReply {
    /// Parses a response body, wrapping non-JSON text as `{"raw": text}`
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str(body) {
            Ok(value) => Self(value),
            Err(_) => Self(serde_json::json!({ "raw": body })),
        }
    }
}

impl fmt::Display for BridgeReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
