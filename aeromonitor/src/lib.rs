//! Headless operations monitor for drone video feeds.
//!
//! - [`StreamListPoller`] keeps the list of visible streams fresh
//! - [`AnalyticsPoller`] gathers people/vehicle counts for them
//! - [`VideoWall`] keeps one playback session per visible stream
//! - [`Monitor`] runs all of the above until shut down
//!
//! Periodic work goes through [`PeriodicTask`], which ties every job to a
//! cancellation token.

pub mod analytics_poller;
pub mod error;
pub mod monitor;
pub mod scheduler;
pub mod status;
pub mod streams_poller;
pub mod wall;

#[cfg(feature = "aeroconfig")]
pub mod config_ext;

pub use analytics_poller::{AnalyticsMap, AnalyticsPoller, RoundOutcome};
pub use error::{MonitorError, Result};
pub use monitor::{Monitor, MonitorSettings};
pub use scheduler::PeriodicTask;
pub use status::StatusPill;
pub use streams_poller::{StreamBoard, StreamListPoller};
pub use wall::{TileStatus, VideoWall, WallChanges};

#[cfg(feature = "aeroconfig")]
pub use config_ext::MonitorConfigExt;
