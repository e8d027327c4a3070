use std::fmt;

use aerofeeds::StreamStatus;
use aeroplayback::SourceKind;

/// Badge shown on a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusPill {
    Live,
    Replay,
    /// Playing the replay window of a stream that stopped publishing.
    Offline,
}

impl StatusPill {
    pub fn resolve(source: SourceKind, status: StreamStatus) -> Self {
        match (source, status) {
            (SourceKind::Live, _) => StatusPill::Live,
            (SourceKind::Replay, StreamStatus::Ended) => StatusPill::Offline,
            (SourceKind::Replay, _) => StatusPill::Replay,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusPill::Live => "LIVE",
            StatusPill::Replay => "REPLAY",
            StatusPill::Offline => "OFFLINE",
        }
    }
}

impl fmt::Display for StatusPill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
