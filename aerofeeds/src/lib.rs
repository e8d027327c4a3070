//! Client library for the AeroWatch drone video backend
//!
//! This crate talks to the three HTTP services behind the operations
//! dashboard:
//!
//! - **Stream registry**: list, create and delete drone stream registrations
//! - **Analytics**: people and vehicle counts per stream
//! - **Incident bridge**: escalate an incident with a frame from a stream
//!
//! It also holds the tile visibility policy deciding which registered
//! streams end up on the video wall.
//!
//! # Example
//!
//! ```no_run
//! use aerofeeds::{FeedsClient, VisibilityPolicy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FeedsClient::new()?;
//!     let streams = client.list_streams().await?;
//!
//!     let now = chrono::Utc::now().timestamp_millis();
//!     for stream in VisibilityPolicy::default().apply(&streams, now) {
//!         println!("[{}] {} - {}", stream.status, stream.stream_key, stream.display_place());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Configuration Extension
//!
//! With the `aeroconfig` feature (default), base URLs and timeouts are read
//! from the `backend.*` configuration keys through [`FeedsConfigExt`].

pub mod client;
pub mod error;
pub mod models;
pub mod visibility;

#[cfg(feature = "aeroconfig")]
pub mod config_ext;

pub use client::{ClientBuilder, FeedsClient};
pub use error::{Error, Result};
pub use models::{
    AnalyticsKind, AnalyticsResponse, BridgeReply, CombinedAnalytics, IncidentRequest,
    IncidentTarget, NewStream, Stream, StreamStatus, ALL_PLACES,
};
pub use visibility::{filter_by_place, places, TileOrder, VisibilityPolicy};

#[cfg(feature = "aeroconfig")]
pub use config_ext::FeedsConfigExt;
