use thiserror::Error;

pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("No tokio runtime available")]
    NoRuntime,
    #[error("Backend error: {0}")]
    Feeds(#[from] aerofeeds::Error),
    #[error("Playback error: {0}")]
    Playback(#[from] aeroplayback::PlaybackError),
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}
