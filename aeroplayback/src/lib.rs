//! Resilient playback of drone HLS feeds.
//!
//! Each visible stream gets a playback session bound to one surface. The
//! session starts on the LIVE playlist, falls back to the looping REPLAY
//! playlist when LIVE fails fatally, and probes LIVE in the background until
//! it can switch back.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use aeroplayback::{
//!     HeadlessSurface, HlsEngineFactory, HttpProbe, PlaybackSession, ReplayUrlPolicy, SessionSpec,
//! };
//!
//! # async fn demo() -> Result<(), aeroplayback::PlaybackError> {
//! let spec = SessionSpec::new(
//!     "EVT-2XL7-KA45",
//!     "http://34.93.170.150/hls/EVT-2XL7-KA45.m3u8",
//!     &ReplayUrlPolicy::SameAsLive,
//! );
//! let handle = PlaybackSession::mount(
//!     spec,
//!     Arc::new(HlsEngineFactory::new(reqwest::Client::new())),
//!     Arc::new(HeadlessSurface::new()),
//!     Arc::new(HttpProbe::new()),
//! )?;
//! println!("{} is on {}", handle.stream_key(), handle.current_source());
//! let report = handle.unmount().await?;
//! println!("{} failovers", report.stats.failovers);
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod engine;
pub mod error;
pub mod hls;
pub mod probe;
pub mod session;
pub mod source;
pub mod surface;

#[cfg(feature = "aeroconfig")]
pub mod config_ext;

#[cfg(test)]
mod testing;

pub use controller::{ControllerStats, ResilienceController, Transition};
pub use engine::{
    EngineEvent, EngineEvents, EngineFactory, EngineGuard, EngineLedger, LedgerSnapshot,
    MediaEngine, TaggedEvent,
};
pub use error::{PlaybackError, Result};
pub use hls::{HlsEngine, HlsEngineFactory, HlsSettings};
pub use probe::{HttpProbe, LiveProbe};
pub use session::{PlaybackSession, SessionHandle, SessionReport, SessionSpec};
pub use source::{EngineProfile, PlaybackSource, ReplayUrlPolicy, SourceKind};
pub use surface::{HeadlessSurface, PlaybackSurface, SurfaceStats};

#[cfg(feature = "aeroconfig")]
pub use config_ext::PlaybackConfigExt;
