use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlaybackError>;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Invalid source URL '{url}': {reason}")]
    InvalidSource { url: String, reason: String },
    #[error("Playback surface is detached")]
    SurfaceDetached,
    #[error("No tokio runtime available")]
    NoRuntime,
    #[error("Playlist error: {0}")]
    Playlist(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Engine error: {0}")]
    Engine(String),
}

impl PlaybackError {
    pub fn invalid_source(url: &str, reason: impl Into<String>) -> Self {
        PlaybackError::InvalidSource {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        PlaybackError::Engine(message.into())
    }
}
